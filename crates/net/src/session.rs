//! Authority and client sessions driven by the tick clock.
//!
//! Both peers run the same [`step`] over the same [`SessionWorld`]. The
//! authority owns truth: it consumes queued inputs, applies interaction
//! grants, flies projectiles and broadcasts a snapshot per character after
//! every tick, plus the interactable registry whenever it changes. The
//! client predicts its own character, sends redundant inputs and reconciles
//! against snapshots. Frames move through [`Transport`](crate::Transport)s
//! owned by the caller.

use crate::codec::{
    compute_schema_hash, decode_client_message, decode_server_message, encode_client_message,
    encode_server_message,
};
use crate::input_queue::InputQueue;
use crate::prediction::{PredictionMetrics, ReconciliationResult, Reconciler};
use crate::protocol::{
    ClientMessage, InputBundle, InteractableSnapshot, ReconciliationSnapshot, ServerMessage,
    TickedInput, PROTOCOL_VERSION,
};
use crate::replay::InputLogger;
use anyhow::Result;
use fpsim_core::clock::TickHooks;
use fpsim_core::{EntityId, PeerId, SimConfig, SimTick, ViewBinding};
use fpsim_input::TickInput;
use fpsim_physics::StaticWorld;
use fpsim_sim::{
    spawn_character, step, Body, CharacterState, CharacterView, Interactable, InteractionCommand,
    Interactables, Projectile, ProjectileOutcome, SimEvent, StepContext, WeaponRegistry,
};
use glam::Vec3;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tracing::{debug, info, instrument, trace, warn};

/// The interactable registry is rebroadcast at least this often so lossy
/// links converge.
pub const INTERACTABLE_RESYNC_TICKS: u64 = 25;

/// Everything a step reads besides the character: tuning, geometry,
/// interactables and weapon variants.
pub struct SessionWorld {
    /// Shared tuning.
    pub config: SimConfig,
    /// Collision geometry.
    pub world: StaticWorld,
    /// Interactables and their locks as seen by this peer.
    pub interactables: Interactables,
    /// Weapon variants.
    pub weapons: WeaponRegistry,
    /// Where new characters appear.
    pub spawn_point: Vec3,
}

impl SessionWorld {
    /// World with weapons registered from `config`.
    pub fn new(config: SimConfig, world: StaticWorld) -> Self {
        let weapons = WeaponRegistry::from_config(&config);
        Self {
            config,
            world,
            interactables: Interactables::new(),
            weapons,
            spawn_point: Vec3::ZERO,
        }
    }

    /// Step context for `tick`.
    pub fn ctx(&self, tick: SimTick) -> StepContext<'_> {
        StepContext {
            config: &self.config,
            world: &self.world,
            interactables: &self.interactables,
            weapons: &self.weapons,
            tick,
        }
    }

    /// Remove an interactable together with every collider it owns.
    pub fn remove_interactable(&mut self, id: EntityId) -> Option<Interactable> {
        let removed = self.interactables.remove(id);
        let colliders = self.world.remove_owned(id);
        debug!(target = id, colliders, "interactable removed");
        removed
    }

    fn apply_commands(&mut self, commands: &[InteractionCommand]) {
        for command in commands {
            self.interactables.apply(command);
        }
    }
}

/// The peer that originates snapshots.
pub struct AuthorityPeer {
    world: SessionWorld,
    characters: BTreeMap<EntityId, CharacterState>,
    inputs: BTreeMap<EntityId, InputQueue>,
    owners: ViewBinding,
    next_entity: EntityId,
    next_tick: SimTick,
    outbox: Vec<(PeerId, Vec<u8>)>,
    events: Vec<(SimTick, SimEvent)>,
    input_logger: Option<InputLogger>,
    projectiles: Vec<Projectile>,
    interactables_sent: Option<Interactables>,
}

impl AuthorityPeer {
    /// Create an authority over `world`.
    pub fn new(world: SessionWorld) -> Self {
        Self {
            world,
            characters: BTreeMap::new(),
            inputs: BTreeMap::new(),
            owners: ViewBinding::new(),
            next_entity: 1,
            next_tick: SimTick::ZERO,
            outbox: Vec::new(),
            events: Vec::new(),
            input_logger: None,
            projectiles: Vec::new(),
            interactables_sent: None,
        }
    }

    /// Record every consumed input to a JSONL file at `path`.
    pub fn enable_input_log(&mut self, path: &Path) -> Result<()> {
        self.input_logger = Some(InputLogger::create(path)?);
        info!(path = %path.display(), "input logging enabled");
        Ok(())
    }

    /// Handle one inbound frame from `from`. Undecodable or invalid frames
    /// are dropped with a warning.
    pub fn handle_frame(&mut self, from: PeerId, data: &[u8]) {
        let message = match decode_client_message(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = from, error = %e, "dropping undecodable client frame");
                return;
            }
        };
        if let Err(reason) = message.verify() {
            warn!(peer = from, reason, "dropping invalid client message");
            return;
        }
        match message {
            ClientMessage::Handshake {
                version,
                schema_hash,
            } => self.handle_handshake(from, version, schema_hash),
            ClientMessage::Input(bundle) => self.handle_input(from, &bundle),
            ClientMessage::Disconnect { reason } => {
                info!(peer = from, %reason, "client disconnected");
                if let Some(entity) = self.owners.unbind(from) {
                    self.despawn(entity);
                }
            }
        }
    }

    fn handle_handshake(&mut self, from: PeerId, version: u16, schema_hash: u64) {
        let rejection = if version != PROTOCOL_VERSION {
            Some(format!("protocol version {version} != {PROTOCOL_VERSION}"))
        } else if schema_hash != compute_schema_hash() {
            Some("schema hash mismatch".to_string())
        } else {
            None
        };
        let response = match rejection {
            Some(reason) => {
                warn!(peer = from, %reason, "handshake rejected");
                ServerMessage::HandshakeResponse {
                    accepted: false,
                    reason: Some(reason),
                    entity: None,
                    tick: self.next_tick,
                }
            }
            None => {
                let entity = match self.owners.entity_for(from) {
                    Some(entity) => entity,
                    None => self.spawn_for(from),
                };
                info!(peer = from, entity, "client admitted");
                self.interactables_sent = None;
                ServerMessage::HandshakeResponse {
                    accepted: true,
                    reason: None,
                    entity: Some(entity),
                    tick: self.next_tick,
                }
            }
        };
        self.send(from, &response);
    }

    fn handle_input(&mut self, from: PeerId, bundle: &InputBundle) {
        if self.owners.entity_for(from) != Some(bundle.entity) {
            warn!(
                peer = from,
                entity = bundle.entity,
                "dropping input for entity not controlled by peer"
            );
            return;
        }
        if let Some(queue) = self.inputs.get_mut(&bundle.entity) {
            let kept = queue.push_bundle(bundle);
            trace!(entity = bundle.entity, kept, "inputs queued");
        }
    }

    fn spawn_for(&mut self, peer: PeerId) -> EntityId {
        let entity = self.next_entity;
        self.next_entity += 1;
        let state = spawn_character(
            entity,
            self.world.spawn_point,
            &self.world.config,
            &self.world.weapons,
        );
        self.characters.insert(entity, state);
        self.inputs.insert(entity, InputQueue::new());
        self.owners.rebind(peer, entity);
        entity
    }

    /// Spawn a character no peer controls. It only receives inputs through
    /// [`AuthorityPeer::queue_input`], and runs on default input otherwise.
    pub fn spawn_local(&mut self, position: Vec3) -> EntityId {
        let entity = self.next_entity;
        self.next_entity += 1;
        let state = spawn_character(entity, position, &self.world.config, &self.world.weapons);
        self.characters.insert(entity, state);
        self.inputs.insert(entity, InputQueue::new());
        entity
    }

    /// Queue an input for `entity` directly, bypassing the network.
    pub fn queue_input(&mut self, entity: EntityId, tick: SimTick, input: TickInput) -> bool {
        self.inputs
            .get_mut(&entity)
            .is_some_and(|queue| queue.push(tick, input))
    }

    fn despawn(&mut self, entity: EntityId) {
        self.characters.remove(&entity);
        self.inputs.remove(&entity);
        self.world.interactables.release_held_by(entity, None);
    }

    fn send(&mut self, to: PeerId, message: &ServerMessage) {
        match encode_server_message(message) {
            Ok(frame) => self.outbox.push((to, frame)),
            Err(e) => warn!(peer = to, error = %e, "failed to encode server message"),
        }
    }

    /// Damage `entity` on behalf of `by`. Returns true if the hit killed.
    pub fn apply_damage(&mut self, entity: EntityId, by: EntityId, amount: f32) -> bool {
        self.damage(self.next_tick.prev(), entity, by, amount)
    }

    fn damage(&mut self, tick: SimTick, entity: EntityId, by: EntityId, amount: f32) -> bool {
        let Some(state) = self.characters.get_mut(&entity) else {
            return false;
        };
        if !state.is_alive() || amount.is_nan() || amount <= 0.0 {
            return false;
        }
        let died = state.health.damage(amount);
        let remaining = state.health.current();
        debug!(entity, by, amount, remaining, "character damaged");
        self.events.push((
            tick,
            SimEvent::Damaged {
                entity,
                by,
                amount,
                remaining,
            },
        ));
        if died {
            state.interacting = None;
            self.world.interactables.release_held_by(entity, None);
            info!(entity, by, "character died");
            self.events.push((tick, SimEvent::Died { entity, by }));
        }
        died
    }

    /// Bring a dead character back at `fraction` of its max health. Living
    /// or unknown entities are left alone.
    pub fn revive(&mut self, entity: EntityId, fraction: f32) -> bool {
        let tick = self.next_tick.prev();
        let Some(state) = self.characters.get_mut(&entity) else {
            return false;
        };
        if state.is_alive() {
            return false;
        }
        state.health.revive(fraction);
        let health = state.health.current();
        info!(entity, health, "character revived");
        self.events.push((tick, SimEvent::Revived { entity, health }));
        true
    }

    /// Projectiles still in flight.
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    fn fly_projectiles(&mut self, tick: SimTick) {
        let config = &self.world.config;
        let dt = config.tick_delta();
        let gravity = config.combat.projectile_gravity;
        let bodies: Vec<Body> = self
            .characters
            .values()
            .filter_map(|state| Body::of(state, &config.motion, &config.combat))
            .collect();
        let world = &self.world.world;

        let mut hits = Vec::new();
        self.projectiles.retain_mut(|projectile| {
            match projectile.advance(world, &bodies, gravity, dt) {
                ProjectileOutcome::Flying => true,
                ProjectileOutcome::Hit { target, point } => {
                    trace!(owner = projectile.owner, ?target, ?point, "projectile hit");
                    if let Some(target) = target {
                        hits.push((target, projectile.owner, projectile.damage));
                    }
                    false
                }
                ProjectileOutcome::Expired => false,
            }
        });
        for (target, by, amount) in hits {
            self.damage(tick, target, by, amount);
        }
    }

    /// Frames produced since the last drain, with their destination.
    pub fn drain_outbox(&mut self) -> Vec<(PeerId, Vec<u8>)> {
        std::mem::take(&mut self.outbox)
    }

    /// Events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<(SimTick, SimEvent)> {
        std::mem::take(&mut self.events)
    }

    /// Authoritative state of `entity`.
    pub fn character(&self, entity: EntityId) -> Option<&CharacterState> {
        self.characters.get(&entity)
    }

    /// Entity controlled by `peer`.
    pub fn entity_for(&self, peer: PeerId) -> Option<EntityId> {
        self.owners.entity_for(peer)
    }

    /// Input queue of `entity`.
    pub fn input_queue(&self, entity: EntityId) -> Option<&InputQueue> {
        self.inputs.get(&entity)
    }

    /// Tick the next `on_tick` is expected to run.
    pub fn next_tick(&self) -> SimTick {
        self.next_tick
    }

    /// Shared world.
    pub fn world(&self) -> &SessionWorld {
        &self.world
    }

    /// Mutable world, for placing interactables and geometry.
    pub fn world_mut(&mut self) -> &mut SessionWorld {
        &mut self.world
    }
}

impl TickHooks for AuthorityPeer {
    #[instrument(skip(self), fields(characters = self.characters.len()))]
    fn on_tick(&mut self, tick: SimTick) {
        self.next_tick = tick.advance(1);
        let mut commands = Vec::new();
        for (entity, state) in self.characters.iter_mut() {
            let input = self
                .inputs
                .get_mut(entity)
                .map_or_else(TickInput::default, |queue| queue.take(tick));
            if let Some(logger) = self.input_logger.as_mut() {
                if let Err(e) = logger.log(tick, *entity, input) {
                    warn!(error = %e, "input log write failed");
                }
            }
            let outcome = step(state, &input, &self.world.ctx(tick));
            *state = outcome.state;
            commands.extend(outcome.effects.commands);
            self.projectiles
                .extend(outcome.effects.events.iter().filter_map(Projectile::from_shot));
            self.events
                .extend(outcome.effects.events.into_iter().map(|e| (tick, e)));
        }
        // Locks change only after every character has seen the start-of-tick state.
        self.world.apply_commands(&commands);

        let dt = self.world.config.tick_delta();
        for completion in self.world.interactables.advance(dt) {
            if let Some(state) = self.characters.get_mut(&completion.interactor) {
                let grant = self
                    .world
                    .interactables
                    .grant(&completion, state, &self.world.weapons);
                debug!(?completion, ?grant, "interaction completed");
            }
            if self.world.interactables.get(completion.target).is_none() {
                self.world.remove_interactable(completion.target);
            }
            self.events.push((tick, completion.event()));
        }

        // Shots fired this tick fly their first segment immediately.
        self.fly_projectiles(tick);
    }

    #[instrument(skip(self))]
    fn on_post_tick(&mut self, tick: SimTick) {
        let snapshots: Vec<ServerMessage> = self
            .characters
            .values()
            .map(|state| {
                ServerMessage::Snapshot(ReconciliationSnapshot {
                    tick,
                    entity: state.entity,
                    state: state.snapshot(&self.world.weapons),
                })
            })
            .collect();
        let peers: Vec<PeerId> = self.owners.iter().map(|(peer, _)| peer).collect();
        for snapshot in &snapshots {
            for peer in &peers {
                self.send(*peer, snapshot);
            }
        }

        let resync = tick.0 % INTERACTABLE_RESYNC_TICKS == 0;
        if resync || self.interactables_sent.as_ref() != Some(&self.world.interactables) {
            let registry = ServerMessage::Interactables(InteractableSnapshot {
                tick,
                entries: self.world.interactables.clone(),
            });
            for peer in &peers {
                self.send(*peer, &registry);
            }
            self.interactables_sent = Some(self.world.interactables.clone());
        }
        if let Some(logger) = self.input_logger.as_mut() {
            if let Err(e) = logger.flush() {
                warn!(error = %e, "input log flush failed");
            }
        }
    }
}

/// Handshake progress of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Handshake not yet answered.
    Connecting,
    /// Admitted and controlling an entity.
    Connected,
    /// Rejected or disconnected by the authority.
    Closed,
}

/// Another peer's character, extrapolated with default input between snapshots.
struct RemoteCharacter {
    last_applied: SimTick,
    state: CharacterState,
}

/// A peer predicting its own character.
pub struct ClientPeer {
    id: PeerId,
    world: SessionWorld,
    status: ClientStatus,
    entity: Option<EntityId>,
    views: ViewBinding,
    local: Option<CharacterState>,
    remotes: BTreeMap<EntityId, RemoteCharacter>,
    reconciler: Reconciler,
    next_input: Option<TickInput>,
    recent_inputs: VecDeque<TickedInput>,
    clock_sync: Option<SimTick>,
    interactables_tick: Option<SimTick>,
    outbox: Vec<Vec<u8>>,
    events: Vec<(SimTick, SimEvent)>,
}

impl ClientPeer {
    /// Create a client identified by `id` and queue its handshake.
    pub fn new(id: PeerId, world: SessionWorld) -> Self {
        let reconciler = Reconciler::new(&world.config.reconcile);
        let mut client = Self {
            id,
            world,
            status: ClientStatus::Connecting,
            entity: None,
            views: ViewBinding::new(),
            local: None,
            remotes: BTreeMap::new(),
            reconciler,
            next_input: None,
            recent_inputs: VecDeque::new(),
            clock_sync: None,
            interactables_tick: None,
            outbox: Vec::new(),
            events: Vec::new(),
        };
        client.send(&ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            schema_hash: compute_schema_hash(),
        });
        client
    }

    /// Input to commit on the next tick. Ticks without one use the default.
    pub fn set_input(&mut self, input: TickInput) {
        self.next_input = Some(input);
    }

    /// Handle one inbound frame from the authority.
    pub fn handle_frame(&mut self, data: &[u8]) {
        let message = match decode_server_message(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = self.id, error = %e, "dropping undecodable server frame");
                return;
            }
        };
        if let Err(reason) = message.verify() {
            warn!(peer = self.id, reason, "dropping invalid server message");
            return;
        }
        match message {
            ServerMessage::HandshakeResponse {
                accepted,
                reason,
                entity,
                tick,
            } => match (accepted, entity) {
                (true, Some(entity)) => {
                    info!(peer = self.id, entity, %tick, "connected");
                    self.status = ClientStatus::Connected;
                    self.entity = Some(entity);
                    self.views.rebind(self.id, entity);
                    self.clock_sync = Some(tick);
                }
                _ => {
                    warn!(peer = self.id, ?reason, "handshake rejected");
                    self.status = ClientStatus::Closed;
                }
            },
            ServerMessage::Snapshot(snapshot) => self.handle_snapshot(&snapshot),
            ServerMessage::Interactables(snapshot) => self.handle_interactables(snapshot),
            ServerMessage::Disconnect { reason } => {
                warn!(peer = self.id, %reason, "authority disconnected");
                self.status = ClientStatus::Closed;
                self.views.unbind(self.id);
            }
        }
    }

    fn handle_snapshot(&mut self, snapshot: &ReconciliationSnapshot) {
        if Some(snapshot.entity) == self.entity {
            let world = &self.world;
            let state = self.local.get_or_insert_with(|| {
                spawn_character(
                    snapshot.entity,
                    snapshot.state.motion.position,
                    &world.config,
                    &world.weapons,
                )
            });
            let result = self
                .reconciler
                .apply_snapshot(snapshot, state, &world.ctx(snapshot.tick));
            if let ReconciliationResult::Applied { .. } = result {
                self.world
                    .interactables
                    .release_held_by(snapshot.entity, state.interacting);
            }
            return;
        }

        match self.remotes.get_mut(&snapshot.entity) {
            Some(remote) if snapshot.tick <= remote.last_applied => {
                trace!(entity = snapshot.entity, tick = %snapshot.tick, "stale remote snapshot");
            }
            Some(remote) => {
                remote.last_applied = snapshot.tick;
                remote.state.restore(&snapshot.state);
            }
            None => {
                let mut state = spawn_character(
                    snapshot.entity,
                    snapshot.state.motion.position,
                    &self.world.config,
                    &self.world.weapons,
                );
                state.restore(&snapshot.state);
                debug!(entity = snapshot.entity, "remote character discovered");
                self.remotes.insert(
                    snapshot.entity,
                    RemoteCharacter {
                        last_applied: snapshot.tick,
                        state,
                    },
                );
            }
        }
    }

    fn handle_interactables(&mut self, snapshot: InteractableSnapshot) {
        if self
            .interactables_tick
            .is_some_and(|last| snapshot.tick <= last)
        {
            trace!(tick = %snapshot.tick, "stale interactable snapshot");
            return;
        }
        self.interactables_tick = Some(snapshot.tick);
        let keep = self.local.as_ref().and_then(|state| state.interacting);
        let removed = self
            .world
            .interactables
            .sync_from(snapshot.entries, self.entity, keep);
        for id in removed {
            self.world.remove_interactable(id);
        }
    }

    fn send(&mut self, message: &ClientMessage) {
        match encode_client_message(message) {
            Ok(frame) => self.outbox.push(frame),
            Err(e) => warn!(peer = self.id, error = %e, "failed to encode client message"),
        }
    }

    /// Queue a disconnect notice.
    pub fn disconnect(&mut self, reason: &str) {
        self.send(&ClientMessage::Disconnect {
            reason: reason.to_string(),
        });
        self.status = ClientStatus::Closed;
    }

    /// Frames produced since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// First-execution events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<(SimTick, SimEvent)> {
        std::mem::take(&mut self.events)
    }

    /// Authority tick reported by the handshake, returned once.
    pub fn take_clock_sync(&mut self) -> Option<SimTick> {
        self.clock_sync.take()
    }

    /// Handshake progress.
    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// Peer id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Entity this client controls.
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// Predicted state of the controlled character.
    pub fn local_character(&self) -> Option<&CharacterState> {
        self.local.as_ref()
    }

    /// Last known state of another character.
    pub fn remote_character(&self, entity: EntityId) -> Option<&CharacterState> {
        self.remotes.get(&entity).map(|remote| &remote.state)
    }

    /// Presentation view of the entity bound to this peer.
    pub fn view(&self) -> Option<CharacterView> {
        let entity = self.views.entity_for(self.id)?;
        let state = match &self.local {
            Some(state) if state.entity == entity => state,
            _ => self.remote_character(entity)?,
        };
        Some(CharacterView::new(
            state,
            &self.world.weapons,
            &self.world.interactables,
        ))
    }

    /// Subscribe to changes of the viewed entity.
    pub fn view_binding_mut(&mut self) -> &mut ViewBinding {
        &mut self.views
    }

    /// Prediction accuracy counters.
    pub fn metrics(&self) -> &PredictionMetrics {
        self.reconciler.metrics()
    }

    /// Reconciler state.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Shared world.
    pub fn world(&self) -> &SessionWorld {
        &self.world
    }

    /// Mutable world, for placing interactables and geometry.
    pub fn world_mut(&mut self) -> &mut SessionWorld {
        &mut self.world
    }
}

impl TickHooks for ClientPeer {
    #[instrument(skip(self), fields(peer = self.id))]
    fn on_tick(&mut self, tick: SimTick) {
        let input = self.next_input.take().unwrap_or_default();
        if let Some(state) = self.local.as_mut() {
            let outcome = step(state, &input, &self.world.ctx(tick));
            *state = outcome.state;
            self.events
                .extend(outcome.effects.events.into_iter().map(|e| (tick, e)));
            self.reconciler
                .record(tick, input, state.snapshot(&self.world.weapons));
            self.world.apply_commands(&outcome.effects.commands);
        }

        for remote in self.remotes.values_mut() {
            let ctx = self.world.ctx(tick);
            remote.state = step(&remote.state, &TickInput::default(), &ctx).state;
        }

        // Progress is shown locally; grants arrive through snapshots.
        let _ = self
            .world
            .interactables
            .advance(self.world.config.tick_delta());

        if self.entity.is_some() {
            self.recent_inputs.push_back(TickedInput { tick, input });
            let keep = self.world.config.reconcile.input_redundancy.max(1);
            while self.recent_inputs.len() > keep {
                self.recent_inputs.pop_front();
            }
        }
    }

    #[instrument(skip(self), fields(peer = self.id))]
    fn on_post_tick(&mut self, _tick: SimTick) {
        let Some(entity) = self.entity else {
            return;
        };
        if self.status != ClientStatus::Connected || self.recent_inputs.is_empty() {
            return;
        }
        let bundle = InputBundle {
            entity,
            inputs: self.recent_inputs.iter().copied().collect(),
        };
        self.send(&ClientMessage::Input(bundle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_core::{ResourcePool, TickClock};
    use fpsim_input::ButtonSet;
    use fpsim_physics::Aabb;
    use fpsim_sim::InteractableKind;
    use glam::Vec2;

    fn world() -> SessionWorld {
        SessionWorld::new(SimConfig::default(), StaticWorld::with_ground(0.0))
    }

    /// Single-use item crate straight ahead of the spawn point.
    fn world_with_crate(id: EntityId) -> SessionWorld {
        let mut world = world();
        world.world.add_box(
            Aabb::new(Vec3::new(-0.5, 0.0, 1.0), Vec3::new(0.5, 2.0, 1.5)),
            Some(id),
        );
        world.interactables.insert(
            id,
            Interactable::new(
                0.2,
                InteractableKind::ItemPickup {
                    item: 3,
                    per_pickup: 1,
                    remaining: 1,
                    infinite: false,
                },
            ),
        );
        world
    }

    fn owns_collider(world: &SessionWorld, id: EntityId) -> bool {
        world.world.colliders().iter().any(|c| c.owner == Some(id))
    }

    fn pump(authority: &mut AuthorityPeer, client: &mut ClientPeer) {
        for frame in client.drain_outbox() {
            authority.handle_frame(client.id(), &frame);
        }
        for (to, frame) in authority.drain_outbox() {
            if to == client.id() {
                client.handle_frame(&frame);
            }
        }
    }

    #[test]
    fn handshake_assigns_entity() {
        let mut authority = AuthorityPeer::new(world());
        let mut client = ClientPeer::new(7, world());
        pump(&mut authority, &mut client);
        assert_eq!(client.status(), ClientStatus::Connected);
        assert_eq!(client.entity(), authority.entity_for(7));
        assert_eq!(client.take_clock_sync(), Some(SimTick::ZERO));
        assert_eq!(client.take_clock_sync(), None);
    }

    #[test]
    fn wrong_schema_rejected() {
        let mut authority = AuthorityPeer::new(world());
        let frame = encode_client_message(&ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            schema_hash: 0,
        })
        .unwrap();
        authority.handle_frame(3, &frame);
        let out = authority.drain_outbox();
        let reply = decode_server_message(&out[0].1).unwrap();
        assert!(matches!(
            reply,
            ServerMessage::HandshakeResponse {
                accepted: false,
                ..
            }
        ));
        assert_eq!(authority.entity_for(3), None);
    }

    #[test]
    fn garbage_frames_are_ignored() {
        let mut authority = AuthorityPeer::new(world());
        authority.handle_frame(1, &[0xff, 0xff, 0xff, 0xff, 1, 2, 3]);
        authority.handle_frame(1, &[]);
        assert!(authority.drain_outbox().is_empty());
    }

    #[test]
    fn input_for_foreign_entity_dropped() {
        let mut authority = AuthorityPeer::new(world());
        let mut a = ClientPeer::new(1, world());
        let mut b = ClientPeer::new(2, world());
        pump(&mut authority, &mut a);
        pump(&mut authority, &mut b);
        let victim = a.entity().unwrap();
        let forged = encode_client_message(&ClientMessage::Input(InputBundle {
            entity: victim,
            inputs: vec![TickedInput {
                tick: SimTick(1),
                input: TickInput {
                    movement: Vec2::new(0.0, 1.0),
                    ..TickInput::default()
                },
            }],
        }))
        .unwrap();
        authority.handle_frame(2, &forged);
        assert_eq!(authority.input_queue(victim).map(InputQueue::len), Some(0));
    }

    #[test]
    fn loopback_prediction_matches_authority() {
        let mut authority = AuthorityPeer::new(world());
        let mut client = ClientPeer::new(1, world());
        pump(&mut authority, &mut client);
        let start = client.take_clock_sync().unwrap();
        let mut server_clock = TickClock::starting_at(50, start);
        let mut client_clock = TickClock::starting_at(50, start);

        for i in 0..40 {
            client.set_input(TickInput {
                movement: Vec2::new(0.0, 1.0),
                look_delta: Vec2::new(if i % 2 == 0 { 1.0 } else { 0.0 }, 0.0),
                ..TickInput::default()
            });
            client_clock.step_once(&mut client);
            pump(&mut authority, &mut client);
            server_clock.step_once(&mut authority);
            pump(&mut authority, &mut client);
        }

        let entity = client.entity().unwrap();
        let predicted = client.local_character().unwrap();
        let truth = authority.character(entity).unwrap();
        assert_eq!(predicted.motion, truth.motion);
        assert_eq!(client.metrics().corrections, 0);
        assert!(client.view().is_some());
    }

    #[test]
    fn depleted_pickup_disappears_on_both_peers() {
        let mut authority = AuthorityPeer::new(world_with_crate(50));
        let mut client = ClientPeer::new(1, world_with_crate(50));
        pump(&mut authority, &mut client);
        let start = client.take_clock_sync().unwrap();
        let mut server_clock = TickClock::starting_at(50, start);
        let mut client_clock = TickClock::starting_at(50, start);

        for i in 0..40 {
            client.set_input(TickInput {
                held: ButtonSet::INTERACT,
                previous: if i == 0 {
                    ButtonSet::empty()
                } else {
                    ButtonSet::INTERACT
                },
                ..TickInput::default()
            });
            client_clock.step_once(&mut client);
            pump(&mut authority, &mut client);
            server_clock.step_once(&mut authority);
            pump(&mut authority, &mut client);
        }

        let entity = client.entity().unwrap();
        assert_eq!(authority.character(entity).unwrap().inventory.count(3), 1);
        assert_eq!(client.local_character().unwrap().inventory.count(3), 1);
        assert!(authority.world().interactables.get(50).is_none());
        assert!(client.world().interactables.get(50).is_none());
        assert!(!owns_collider(authority.world(), 50));
        assert!(!owns_collider(client.world(), 50));
        assert_eq!(client.local_character().unwrap().interacting, None);
        assert_eq!(client.local_character().unwrap().looking_at, None);

        let completions = authority
            .drain_events()
            .into_iter()
            .filter(|(_, e)| matches!(e, SimEvent::InteractionCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[test]
    fn stale_interactable_broadcast_is_ignored() {
        let mut client = ClientPeer::new(1, world_with_crate(50));
        let fresh = encode_server_message(&ServerMessage::Interactables(InteractableSnapshot {
            tick: SimTick(10),
            entries: Interactables::new(),
        }))
        .unwrap();
        let mut stale_entries = Interactables::new();
        stale_entries.insert(60, Interactable::new(1.0, InteractableKind::Generic));
        let stale = encode_server_message(&ServerMessage::Interactables(InteractableSnapshot {
            tick: SimTick(9),
            entries: stale_entries,
        }))
        .unwrap();

        client.handle_frame(&fresh);
        assert!(client.world().interactables.is_empty());
        assert!(!owns_collider(client.world(), 50));
        client.handle_frame(&stale);
        assert!(client.world().interactables.get(60).is_none());
    }

    #[test]
    fn projectiles_kill_and_revive_restores() {
        let mut config = SimConfig::default();
        for gun in &mut config.weapons {
            gun.recoil_force = Vec2::ZERO;
        }
        let mut authority =
            AuthorityPeer::new(SessionWorld::new(config, StaticWorld::with_ground(0.0)));
        let shooter = authority.spawn_local(Vec3::ZERO);
        let target = authority.spawn_local(Vec3::new(0.0, 0.0, 10.0));
        let mut clock = TickClock::starting_at(50, SimTick::ZERO);

        let trigger = TickInput {
            held: ButtonSet::SHOOT,
            previous: ButtonSet::SHOOT,
            ..TickInput::default()
        };
        for _ in 0..150 {
            let tick = authority.next_tick();
            authority.queue_input(shooter, tick, trigger);
            clock.step_once(&mut authority);
        }

        let events = authority.drain_events();
        let deaths: Vec<_> = events
            .iter()
            .filter_map(|(_, e)| match e {
                SimEvent::Died { entity, by } => Some((*entity, *by)),
                _ => None,
            })
            .collect();
        assert_eq!(deaths, vec![(target, shooter)]);
        assert!(events.iter().all(|(_, e)| !matches!(
            e,
            SimEvent::Damaged { entity, .. } if *entity == shooter
        )));
        assert!(!authority.character(target).unwrap().is_alive());
        assert_eq!(authority.character(shooter).unwrap().health.current(), 100.0);

        let frozen = authority.character(target).unwrap().motion;
        let walk = TickInput {
            movement: Vec2::Y,
            ..TickInput::default()
        };
        for _ in 0..10 {
            let tick = authority.next_tick();
            authority.queue_input(target, tick, walk);
            clock.step_once(&mut authority);
        }
        assert_eq!(authority.character(target).unwrap().motion, frozen);
        assert!(!authority.revive(shooter, 1.0));

        assert!(authority.revive(target, 0.5));
        assert_eq!(authority.character(target).unwrap().health.current(), 50.0);
        for _ in 0..10 {
            let tick = authority.next_tick();
            authority.queue_input(target, tick, walk);
            clock.step_once(&mut authority);
        }
        let moved = authority.character(target).unwrap().motion.position;
        assert!(moved.z > frozen.position.z);
    }
}
