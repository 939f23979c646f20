//! Headless authority + predicting client wired through simulated links.

use crate::scripted_input::ScriptedInputPlayer;
use anyhow::{bail, Context, Result};
use fpsim_core::{EntityId, SimConfig, SimTick, TickClock};
use fpsim_input::InputSampler;
use fpsim_net::{
    AuthorityPeer, ClientPeer, ClientStatus, LinkConditions, LinkStats, PredictionMetrics,
    ReplayPlayer, SessionWorld, SimulatedLink, Transport,
};
use fpsim_physics::{Aabb, StaticWorld};
use fpsim_sim::{CharacterState, Interactable, InteractableKind, SimEvent};
use glam::Vec3;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CLIENT_PEER: u32 = 1;
const AMMO_CRATE: EntityId = 1000;
const MEDKIT_SHELF: EntityId = 1001;

/// Knobs of one loopback run.
pub struct LoopbackOptions {
    pub ticks: u64,
    pub link: LinkConditions,
    pub record: Option<PathBuf>,
    pub sensitivity: f32,
}

/// Outcome of a loopback run.
#[derive(Debug)]
pub struct LoopbackReport {
    pub ticks: u64,
    pub entity: EntityId,
    pub client_shots: usize,
    pub authority_shots: usize,
    pub interactions_completed: usize,
    pub prediction: PredictionMetrics,
    pub to_server: LinkStats,
    pub to_client: LinkStats,
    pub authority: CharacterState,
    pub client: CharacterState,
}

impl LoopbackReport {
    /// Distance between the client's final prediction and the authority.
    pub fn divergence(&self) -> f32 {
        self.client
            .motion
            .position
            .distance(self.authority.motion.position)
    }
}

/// Ground, a few crates, an ammo crate and a shelf of medkits.
pub fn demo_world(config: &SimConfig) -> SessionWorld {
    let mut world = StaticWorld::with_ground(0.0);
    world
        .add_box(
            Aabb::new(Vec3::new(3.0, 0.0, 3.0), Vec3::new(5.0, 1.0, 5.0)),
            None,
        )
        .add_box(
            Aabb::new(Vec3::new(-12.0, 0.0, -12.0), Vec3::new(-11.0, 3.0, 12.0)),
            None,
        )
        .add_box(
            Aabb::from_center_size(Vec3::new(0.0, 1.0, 4.0), Vec3::new(1.0, 2.0, 1.0)),
            Some(AMMO_CRATE),
        )
        .add_box(
            Aabb::from_center_size(Vec3::new(-4.0, 1.0, 0.0), Vec3::new(1.0, 2.0, 2.0)),
            Some(MEDKIT_SHELF),
        );

    let mut session = SessionWorld::new(config.clone(), world);
    session.interactables.insert(
        AMMO_CRATE,
        Interactable::new(
            1.0,
            InteractableKind::AmmoPickup {
                amount: 60,
                infinite: false,
            },
        ),
    );
    session.interactables.insert(
        MEDKIT_SHELF,
        Interactable::new(
            0.5,
            InteractableKind::ItemPickup {
                item: 7,
                per_pickup: 1,
                remaining: 3,
                infinite: false,
            },
        ),
    );
    session
}

/// Run the scripted client against the authority for `options.ticks` ticks.
pub fn run(
    config: &SimConfig,
    mut script: ScriptedInputPlayer,
    options: &LoopbackOptions,
) -> Result<LoopbackReport> {
    let mut authority = AuthorityPeer::new(demo_world(config));
    if let Some(path) = &options.record {
        authority.enable_input_log(path)?;
    }
    let mut client = ClientPeer::new(CLIENT_PEER, demo_world(config));

    // The handshake travels over a perfect link so the clocks can be aligned.
    for frame in client.drain_outbox() {
        authority.handle_frame(CLIENT_PEER, &frame);
    }
    for (_, frame) in authority.drain_outbox() {
        client.handle_frame(&frame);
    }
    if client.status() != ClientStatus::Connected {
        bail!("authority rejected the client handshake");
    }
    let entity = client.entity().context("handshake did not assign an entity")?;
    let start = client
        .take_clock_sync()
        .context("handshake did not report a tick")?;

    let link = options.link;
    let lead = 2 * (link.latency_ticks + link.jitter_ticks) + 2;
    let mut server_clock = TickClock::starting_at(config.tick_rate, start);
    let mut client_clock = TickClock::starting_at(config.tick_rate, start.advance(lead));
    let mut to_server = SimulatedLink::new(link);
    let mut to_client = SimulatedLink::new(LinkConditions {
        seed: link.seed.wrapping_add(1),
        ..link
    });
    let mut sampler = InputSampler::new(options.sensitivity);
    let dt = client_clock.delta();
    info!(entity, lead, ?link, "loopback session started");

    let mut client_events: Vec<(SimTick, SimEvent)> = Vec::new();
    let mut authority_events: Vec<(SimTick, SimEvent)> = Vec::new();
    for n in 0..options.ticks {
        let now = SimTick(n);
        sampler.sample_frame(&script.advance(dt));
        client.set_input(sampler.commit());
        client_clock.step_once(&mut client);
        client_events.extend(client.drain_events());
        for frame in client.drain_outbox() {
            to_server.send(frame, now);
        }

        for frame in to_server.receive(now) {
            authority.handle_frame(CLIENT_PEER, &frame);
        }
        server_clock.step_once(&mut authority);
        authority_events.extend(authority.drain_events());
        for (_, frame) in authority.drain_outbox() {
            to_client.send(frame, now);
        }

        for frame in to_client.receive(now) {
            client.handle_frame(&frame);
        }
        if let Some(view) = client.view() {
            debug!(
                tick = %client_clock.current_tick(),
                position = ?view.position,
                mode = ?view.move_mode,
                ammo = ?view.weapon.as_ref().map(|w| w.ammo_text.as_str()),
                "client view"
            );
        }
    }

    let shots = |events: &[(SimTick, SimEvent)]| {
        events
            .iter()
            .filter(|(_, e)| matches!(e, SimEvent::ShotFired { .. }))
            .count()
    };
    let interactions_completed = authority_events
        .iter()
        .filter(|(_, e)| matches!(e, SimEvent::InteractionCompleted { .. }))
        .count();

    Ok(LoopbackReport {
        ticks: options.ticks,
        entity,
        client_shots: shots(&client_events),
        authority_shots: shots(&authority_events),
        interactions_completed,
        prediction: client.metrics().clone(),
        to_server: to_server.stats(),
        to_client: to_client.stats(),
        authority: authority
            .character(entity)
            .cloned()
            .context("authority lost the client's character")?,
        client: client
            .local_character()
            .cloned()
            .context("client never received its own snapshot")?,
    })
}

/// Re-run a recorded input log on a fresh authority and return the final
/// state of `entity`.
pub fn replay_log(config: &SimConfig, path: &Path, entity: EntityId) -> Result<CharacterState> {
    let mut player = ReplayPlayer::load(path)?;
    let mut authority = AuthorityPeer::new(demo_world(config));
    let spawned = authority.spawn_local(authority.world().spawn_point);
    if spawned != entity {
        bail!("replay spawned entity {spawned}, log is for {entity}");
    }
    let mut clock = TickClock::new(config.tick_rate);
    while !player.is_finished() {
        let tick = clock.current_tick();
        for entry in player.inputs_for_tick(tick) {
            authority.queue_input(entry.entity, entry.tick, entry.input);
        }
        clock.step_once(&mut authority);
        authority.drain_outbox();
    }
    info!(entries = player.entry_count(), "replay finished");
    authority
        .character(entity)
        .cloned()
        .context("replayed character missing")
}
