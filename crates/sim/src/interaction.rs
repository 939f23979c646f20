//! Interactable world objects and their lock state machine.
//!
//! A target is `Idle` or locked by exactly one interactor. Progress only
//! accumulates while locked, completes once, then returns to `Idle`.

use crate::events::{InteractionCommand, SimEvent};
use crate::state::CharacterState;
use crate::weapon::WeaponRegistry;
use fpsim_core::{EntityId, ItemId, ResourcePool};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Lock held on an interactable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    /// Free.
    #[default]
    Idle,
    /// Held by one interactor.
    Locked(EntityId),
}

/// What completing an interaction grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractableKind {
    /// No built-in effect; consumers react to the completion event.
    Generic,
    /// Refills the active gun's reserve by up to one magazine. Guns without
    /// a reserve pool are not eligible.
    AmmoPickup {
        /// Rounds left in the pickup.
        amount: u32,
        /// Never depletes.
        infinite: bool,
    },
    /// Adds items to the interactor's inventory.
    ItemPickup {
        /// Item granted.
        item: ItemId,
        /// Items granted per completion.
        per_pickup: u32,
        /// Items left in the pickup.
        remaining: u32,
        /// Never depletes.
        infinite: bool,
    },
}

/// One interactable target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interactable {
    /// Seconds of continuous interaction needed to complete.
    pub duration: f32,
    /// Rejects every interactor while set.
    pub blocked: bool,
    /// Completion effect.
    pub kind: InteractableKind,
    progress: f32,
    lock: LockState,
}

impl Interactable {
    /// Idle interactable.
    pub fn new(duration: f32, kind: InteractableKind) -> Self {
        Self {
            duration,
            blocked: false,
            kind,
            progress: 0.0,
            lock: LockState::Idle,
        }
    }

    /// Current lock.
    pub fn lock(&self) -> LockState {
        self.lock
    }

    /// Entity holding the lock.
    pub fn interactor(&self) -> Option<EntityId> {
        match self.lock {
            LockState::Idle => None,
            LockState::Locked(entity) => Some(entity),
        }
    }

    /// Completion fraction in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.progress / self.duration).clamp(0.0, 1.0)
    }

    /// Finite, non-negative timing values.
    pub fn is_well_formed(&self) -> bool {
        self.duration.is_finite()
            && self.duration >= 0.0
            && self.progress.is_finite()
            && self.progress >= 0.0
    }

    /// Per-kind eligibility predicate.
    pub fn is_eligible(&self, character: &CharacterState, weapons: &WeaponRegistry) -> bool {
        match self.kind {
            InteractableKind::AmmoPickup { .. } => {
                character.active_weapon().is_some_and(|w| {
                    w.state.reserve.is_some()
                        && weapons
                            .get(&w.kind)
                            .is_some_and(|behavior| behavior.magazine_size().is_some())
                })
            }
            InteractableKind::Generic | InteractableKind::ItemPickup { .. } => true,
        }
    }

    /// True if `character` may take or keep the lock.
    pub fn can_interact(&self, character: &CharacterState, weapons: &WeaponRegistry) -> bool {
        if self.blocked {
            return false;
        }
        let free = match self.lock {
            LockState::Idle => true,
            LockState::Locked(holder) => holder == character.entity,
        };
        free && self.is_eligible(character, weapons)
    }

    fn start(&mut self, interactor: EntityId) -> bool {
        match self.lock {
            LockState::Idle => {
                self.lock = LockState::Locked(interactor);
                true
            }
            LockState::Locked(holder) => holder == interactor,
        }
    }

    fn stop(&mut self, interactor: EntityId) -> bool {
        if self.lock != LockState::Locked(interactor) {
            return false;
        }
        self.lock = LockState::Idle;
        self.progress = 0.0;
        true
    }

    fn advance(&mut self, dt: f32) -> Option<EntityId> {
        let interactor = self.interactor()?;
        self.progress += dt;
        if self.progress < self.duration {
            return None;
        }
        self.lock = LockState::Idle;
        self.progress = 0.0;
        Some(interactor)
    }
}

/// A finished interaction awaiting its grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Interactable.
    pub target: EntityId,
    /// Entity that held the lock.
    pub interactor: EntityId,
}

impl Completion {
    /// Event announcing this completion.
    pub fn event(&self) -> SimEvent {
        SimEvent::InteractionCompleted {
            entity: self.interactor,
            target: self.target,
        }
    }
}

/// What a completed pickup actually granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Rounds added to the active gun's reserve.
    Ammo(u32),
    /// Items added to the inventory.
    Items {
        /// Item granted.
        item: ItemId,
        /// Amount that fit.
        amount: u32,
    },
}

/// All interactables in a session, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interactables {
    entries: BTreeMap<EntityId, Interactable>,
}

impl Interactables {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an interactable.
    pub fn insert(&mut self, id: EntityId, interactable: Interactable) -> Option<Interactable> {
        self.entries.insert(id, interactable)
    }

    /// Remove an interactable; characters holding it drop it on their next step.
    pub fn remove(&mut self, id: EntityId) -> Option<Interactable> {
        self.entries.remove(&id)
    }

    /// Look up an interactable.
    pub fn get(&self, id: EntityId) -> Option<&Interactable> {
        self.entries.get(&id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Interactable> {
        self.entries.get_mut(&id)
    }

    /// Number of registered interactables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Interactable)> {
        self.entries.iter().map(|(id, i)| (*id, i))
    }

    /// Apply a lock command from a step. Commands on missing targets are ignored.
    pub fn apply(&mut self, command: &InteractionCommand) -> bool {
        let applied = match *command {
            InteractionCommand::Start { interactor, target } => self
                .entries
                .get_mut(&target)
                .is_some_and(|i| i.start(interactor)),
            InteractionCommand::Stop { interactor, target } => self
                .entries
                .get_mut(&target)
                .is_some_and(|i| i.stop(interactor)),
        };
        debug!(?command, applied, "interaction command");
        applied
    }

    /// Release every lock held by `interactor` except the one on `keep`.
    pub fn release_held_by(&mut self, interactor: EntityId, keep: Option<EntityId>) {
        for (id, entry) in &mut self.entries {
            if Some(*id) != keep {
                entry.stop(interactor);
            }
        }
    }

    /// Replace this view with `authoritative`, returning the ids that
    /// disappeared.
    ///
    /// The lock and progress `interactor` predicts on `keep` survive unless
    /// the authority shows that target held by someone else. Any other lock
    /// the authority still attributes to `interactor` is released. Without an
    /// interactor the authoritative view is taken as is.
    pub fn sync_from(
        &mut self,
        authoritative: Interactables,
        interactor: Option<EntityId>,
        keep: Option<EntityId>,
    ) -> Vec<EntityId> {
        let removed = self
            .entries
            .keys()
            .filter(|id| !authoritative.entries.contains_key(id))
            .copied()
            .collect();

        let mut next = authoritative;
        if let Some(interactor) = interactor {
            let predicted = keep.and_then(|target| {
                self.entries
                    .get(&target)
                    .filter(|local| local.lock == LockState::Locked(interactor))
                    .map(|local| (target, local))
            });
            if let Some((target, local)) = predicted {
                if let Some(incoming) = next.entries.get_mut(&target) {
                    let contested =
                        matches!(incoming.lock, LockState::Locked(holder) if holder != interactor);
                    if !contested {
                        incoming.lock = local.lock;
                        incoming.progress = local.progress;
                    }
                }
            }
            next.release_held_by(interactor, keep);
        }
        self.entries = next.entries;
        removed
    }

    /// Advance every locked target by `dt`, returning completions in id order.
    pub fn advance(&mut self, dt: f32) -> Vec<Completion> {
        self.entries
            .iter_mut()
            .filter_map(|(target, entry)| {
                entry.advance(dt).map(|interactor| Completion {
                    target: *target,
                    interactor,
                })
            })
            .collect()
    }

    /// Apply a completion's effect to its interactor. Runs on the authority
    /// only; clients receive the outcome through snapshots.
    ///
    /// Depleted pickups are removed. Returns `None` when nothing was granted.
    pub fn grant(
        &mut self,
        completion: &Completion,
        character: &mut CharacterState,
        weapons: &WeaponRegistry,
    ) -> Option<Grant> {
        let entry = self.entries.get_mut(&completion.target)?;
        if !entry.is_eligible(character, weapons) {
            return None;
        }

        let (grant, depleted) = match &mut entry.kind {
            InteractableKind::Generic => return None,
            InteractableKind::AmmoPickup { amount, infinite } => {
                let capacity = character
                    .active_weapon()
                    .and_then(|w| weapons.get(&w.kind))
                    .and_then(|b| b.magazine_size())?;
                let granted = if *infinite { capacity } else { (*amount).min(capacity) };
                let reserve = character.active_weapon_mut()?.state.reserve.as_mut()?;
                *reserve = reserve.saturating_add(granted);
                if !*infinite {
                    *amount -= granted;
                }
                (Grant::Ammo(granted), !*infinite && *amount == 0)
            }
            InteractableKind::ItemPickup {
                item,
                per_pickup,
                remaining,
                infinite,
            } => {
                let offered = if *infinite {
                    *per_pickup
                } else {
                    (*remaining).min(*per_pickup)
                };
                let leftover = character.inventory.add(*item, offered);
                let taken = offered - leftover;
                if !*infinite {
                    *remaining -= taken;
                }
                (
                    Grant::Items {
                        item: *item,
                        amount: taken,
                    },
                    !*infinite && *remaining == 0,
                )
            }
        };

        if depleted {
            debug!(target = completion.target, "pickup depleted");
            self.entries.remove(&completion.target);
        }
        Some(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EquippedWeapon;
    use crate::weapon::Gun;
    use fpsim_core::{AmmoSource, GunConfig, Inventory, SimConfig};
    use glam::Vec3;

    fn armed(entity: EntityId, registry: &WeaponRegistry) -> CharacterState {
        let mut character = CharacterState::new(entity, Vec3::ZERO);
        character.weapons = registry.equip(&["rifle".into()]);
        character.motion.active_slot = Some(0);
        character
    }

    fn start(registry: &mut Interactables, interactor: EntityId, target: EntityId) -> bool {
        registry.apply(&InteractionCommand::Start { interactor, target })
    }

    #[test]
    fn lock_is_exclusive() {
        let weapons = WeaponRegistry::new();
        let mut registry = Interactables::new();
        registry.insert(5, Interactable::new(0.5, InteractableKind::Generic));

        assert!(start(&mut registry, 1, 5));
        let other = CharacterState::new(2, Vec3::ZERO);
        let owner = CharacterState::new(1, Vec3::ZERO);
        let target = registry.get(5).unwrap();
        assert!(!target.can_interact(&other, &weapons));
        assert!(target.can_interact(&owner, &weapons));
        assert!(!start(&mut registry, 2, 5));
        assert_eq!(registry.get(5).unwrap().interactor(), Some(1));
    }

    #[test]
    fn completes_exactly_once() {
        let mut registry = Interactables::new();
        registry.insert(5, Interactable::new(0.1, InteractableKind::Generic));
        start(&mut registry, 1, 5);

        let mut completions = Vec::new();
        for _ in 0..20 {
            completions.extend(registry.advance(0.02));
        }
        assert_eq!(
            completions,
            vec![Completion {
                target: 5,
                interactor: 1
            }]
        );
        assert_eq!(registry.get(5).unwrap().lock(), LockState::Idle);
    }

    #[test]
    fn stop_resets_progress() {
        let mut registry = Interactables::new();
        registry.insert(5, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut registry, 1, 5);
        registry.advance(0.5);
        assert!(registry.get(5).unwrap().progress() > 0.0);

        assert!(!registry.apply(&InteractionCommand::Stop {
            interactor: 2,
            target: 5
        }));
        assert!(registry.apply(&InteractionCommand::Stop {
            interactor: 1,
            target: 5
        }));
        assert_eq!(registry.get(5).unwrap().progress(), 0.0);
    }

    #[test]
    fn blocked_targets_reject_everyone() {
        let weapons = WeaponRegistry::new();
        let mut target = Interactable::new(1.0, InteractableKind::Generic);
        target.blocked = true;
        assert!(!target.can_interact(&CharacterState::new(1, Vec3::ZERO), &weapons));
    }

    #[test]
    fn ammo_pickup_requires_gun_and_depletes() {
        let weapons = WeaponRegistry::from_config(&SimConfig::default());
        let mut registry = Interactables::new();
        registry.insert(
            9,
            Interactable::new(
                0.5,
                InteractableKind::AmmoPickup {
                    amount: 40,
                    infinite: false,
                },
            ),
        );
        let unarmed = CharacterState::new(1, Vec3::ZERO);
        assert!(!registry.get(9).unwrap().can_interact(&unarmed, &weapons));

        let mut character = armed(1, &weapons);
        let completion = Completion {
            target: 9,
            interactor: 1,
        };
        assert_eq!(
            registry.grant(&completion, &mut character, &weapons),
            Some(Grant::Ammo(30))
        );
        assert_eq!(character.weapons[0].state.reserve, Some(120));
        assert_eq!(
            registry.grant(&completion, &mut character, &weapons),
            Some(Grant::Ammo(10))
        );
        assert!(registry.get(9).is_none());
        assert_eq!(registry.grant(&completion, &mut character, &weapons), None);
    }

    #[test]
    fn infinite_ammo_gun_leaves_pickup_untouched() {
        let mut weapons = WeaponRegistry::new();
        weapons.register(Box::new(Gun::new(GunConfig {
            ammo: AmmoSource::Infinite,
            ..GunConfig::rifle()
        })));
        let mut registry = Interactables::new();
        registry.insert(
            9,
            Interactable::new(
                0.5,
                InteractableKind::AmmoPickup {
                    amount: 30,
                    infinite: false,
                },
            ),
        );
        let mut character = armed(1, &weapons);
        assert_eq!(character.weapons[0].state.reserve, None);
        assert!(!registry.get(9).unwrap().can_interact(&character, &weapons));

        let completion = Completion {
            target: 9,
            interactor: 1,
        };
        assert_eq!(registry.grant(&completion, &mut character, &weapons), None);
        match registry.get(9).map(|i| i.kind) {
            Some(InteractableKind::AmmoPickup { amount, .. }) => assert_eq!(amount, 30),
            other => panic!("pickup should be intact, got {other:?}"),
        }
    }

    #[test]
    fn item_pickup_keeps_leftovers_when_inventory_full() {
        let weapons = WeaponRegistry::new();
        let mut registry = Interactables::new();
        registry.insert(
            3,
            Interactable::new(
                0.5,
                InteractableKind::ItemPickup {
                    item: 7,
                    per_pickup: 5,
                    remaining: 8,
                    infinite: false,
                },
            ),
        );
        let mut character = CharacterState::new(1, Vec3::ZERO);
        character.inventory = Inventory::new(1).with_stack_limit(7, 3);
        let completion = Completion {
            target: 3,
            interactor: 1,
        };

        assert_eq!(
            registry.grant(&completion, &mut character, &weapons),
            Some(Grant::Items { item: 7, amount: 3 })
        );
        assert_eq!(character.inventory.count(7), 3);
        match registry.get(3).unwrap().kind {
            InteractableKind::ItemPickup { remaining, .. } => assert_eq!(remaining, 5),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn release_keeps_requested_lock() {
        let mut registry = Interactables::new();
        registry.insert(1, Interactable::new(1.0, InteractableKind::Generic));
        registry.insert(2, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut registry, 7, 1);
        start(&mut registry, 7, 2);
        registry.release_held_by(7, Some(2));
        assert_eq!(registry.get(1).unwrap().interactor(), None);
        assert_eq!(registry.get(2).unwrap().interactor(), Some(7));
    }

    #[test]
    fn sync_keeps_predicted_lock_and_drops_depleted() {
        let mut local = Interactables::new();
        local.insert(1, Interactable::new(1.0, InteractableKind::Generic));
        local.insert(2, Interactable::new(1.0, InteractableKind::Generic));
        local.insert(3, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut local, 7, 1);
        local.advance(0.4);

        let mut truth = Interactables::new();
        truth.insert(1, Interactable::new(1.0, InteractableKind::Generic));
        truth.insert(2, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut truth, 7, 2);

        let removed = local.sync_from(truth, Some(7), Some(1));
        assert_eq!(removed, vec![3]);
        assert_eq!(local.len(), 2);
        assert_eq!(local.get(1).unwrap().interactor(), Some(7));
        assert!((local.get(1).unwrap().progress() - 0.4).abs() < 1e-6);
        assert_eq!(local.get(2).unwrap().interactor(), None);
    }

    #[test]
    fn sync_yields_to_other_holder() {
        let mut local = Interactables::new();
        local.insert(1, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut local, 7, 1);

        let mut truth = Interactables::new();
        truth.insert(1, Interactable::new(1.0, InteractableKind::Generic));
        start(&mut truth, 8, 1);

        assert!(local.sync_from(truth, Some(7), Some(1)).is_empty());
        assert_eq!(local.get(1).unwrap().interactor(), Some(8));
    }

    #[test]
    fn equipped_weapon_kind_is_checked() {
        let weapons = WeaponRegistry::new();
        let mut character = CharacterState::new(1, Vec3::ZERO);
        character.weapons.push(EquippedWeapon {
            kind: "unregistered".into(),
            state: Default::default(),
        });
        character.motion.active_slot = Some(0);
        let pickup = Interactable::new(
            0.5,
            InteractableKind::AmmoPickup {
                amount: 1,
                infinite: true,
            },
        );
        assert!(!pickup.is_eligible(&character, &weapons));
    }
}
