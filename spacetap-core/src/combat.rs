//! Turn-based space combat.
//!
//! Each player turn is a player volley followed, if the enemy survives, by
//! an enemy volley. Damage is rolled uniformly from each side's attack
//! range, so passing a seeded RNG makes a fight reproducible.

use crate::currency::Currency;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hull the player starts each fight with.
pub const PLAYER_BASE_HULL: i32 = 100;

/// A fight still undecided after this many turns counts as a defeat.
pub const MAX_TURNS: u32 = 100;

/// Highest pirate difficulty.
pub const MAX_DIFFICULTY: u32 = 1_000;

/// Errors from combat actions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CombatError {
    #[error("The encounter is already over")]
    Finished,
}

/// One side of a fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    pub hull: i32,
    pub max_hull: i32,
    pub attack_min: i32,
    pub attack_max: i32,
}

impl Combatant {
    pub fn new(name: impl Into<String>, hull: i32, attack_min: i32, attack_max: i32) -> Self {
        let attack_min = attack_min.max(0);
        Self {
            name: name.into(),
            hull,
            max_hull: hull,
            attack_min,
            attack_max: attack_max.max(attack_min),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.hull <= 0
    }

    fn roll_attack<R: Rng>(&self, rng: &mut R) -> i32 {
        rng.gen_range(self.attack_min..=self.attack_max)
    }

    fn take_damage(&mut self, amount: i32) {
        self.hull = (self.hull - amount).max(0);
    }
}

/// How a fight ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CombatOutcome {
    Victory { reward: f64, currency: Currency },
    Defeat,
}

impl CombatOutcome {
    pub fn is_victory(&self) -> bool {
        matches!(self, CombatOutcome::Victory { .. })
    }
}

/// Result of one player turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnResult {
    /// Both ships still fly.
    Ongoing { dealt: i32, taken: i32 },
    Finished(CombatOutcome),
}

/// A single fight against one enemy ship.
#[derive(Debug, Clone)]
pub struct CombatEncounter {
    player: Combatant,
    enemy: Combatant,
    reward: f64,
    reward_currency: Currency,
    turns: u32,
    outcome: Option<CombatOutcome>,
}

impl CombatEncounter {
    pub fn new(player: Combatant, enemy: Combatant) -> Self {
        Self {
            player,
            enemy,
            reward: 10.0,
            reward_currency: Currency::Quark,
            turns: 0,
            outcome: None,
        }
    }

    /// A pirate scaled to `difficulty` (capped at [`MAX_DIFFICULTY`]), against
    /// a player ship whose attack grows with `ship_power`.
    pub fn pirate(difficulty: u32, ship_power: u32) -> Self {
        let difficulty = difficulty.clamp(1, MAX_DIFFICULTY) as i32;
        let power = ship_power.min(1_000) as i32;

        let player = Combatant::new("Player Ship", PLAYER_BASE_HULL, 8 + power, 15 + power * 2);
        let enemy = Combatant::new(
            format!("Pirate Raider Mk {difficulty}"),
            40 + difficulty * 20,
            3 + difficulty * 2,
            8 + difficulty * 3,
        );

        Self::new(player, enemy).with_reward(10.0 * difficulty as f64, Currency::Quark)
    }

    pub fn with_reward(mut self, reward: f64, currency: Currency) -> Self {
        self.reward = reward;
        self.reward_currency = currency;
        self
    }

    pub fn player(&self) -> &Combatant {
        &self.player
    }

    pub fn enemy(&self) -> &Combatant {
        &self.enemy
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn outcome(&self) -> Option<CombatOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Fire at the enemy, then take its return fire.
    pub fn player_turn<R: Rng>(&mut self, rng: &mut R) -> Result<TurnResult, CombatError> {
        if self.outcome.is_some() {
            return Err(CombatError::Finished);
        }
        self.turns += 1;

        let dealt = self.player.roll_attack(rng);
        self.enemy.take_damage(dealt);
        if self.enemy.is_destroyed() {
            let outcome = CombatOutcome::Victory {
                reward: self.reward,
                currency: self.reward_currency,
            };
            return Ok(self.finish(outcome));
        }

        let taken = self.enemy.roll_attack(rng);
        self.player.take_damage(taken);
        if self.player.is_destroyed() || self.turns >= MAX_TURNS {
            return Ok(self.finish(CombatOutcome::Defeat));
        }

        Ok(TurnResult::Ongoing { dealt, taken })
    }

    /// Play turns until one side is destroyed.
    pub fn resolve<R: Rng>(&mut self, rng: &mut R) -> CombatOutcome {
        loop {
            match self.player_turn(rng) {
                Ok(TurnResult::Ongoing { .. }) => continue,
                Ok(TurnResult::Finished(outcome)) => return outcome,
                Err(CombatError::Finished) => {
                    return self.outcome.unwrap_or(CombatOutcome::Defeat)
                }
            }
        }
    }

    fn finish(&mut self, outcome: CombatOutcome) -> TurnResult {
        tracing::debug!(
            "Combat against {} ended after {} turns: {:?}",
            self.enemy.name,
            self.turns,
            outcome
        );
        self.outcome = Some(outcome);
        TurnResult::Finished(outcome)
    }
}
