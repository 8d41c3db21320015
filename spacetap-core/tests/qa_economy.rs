//! QA tests for the economy: ledger, number display, upgrades, trading and
//! combat consequences.
//!
//! Run with: `cargo test -p spacetap-core --test qa_economy`

use rand::rngs::StdRng;
use rand::SeedableRng;
use spacetap_core::combat::{CombatEncounter, Combatant};
use spacetap_core::format::generate_suffixes;
use spacetap_core::progress::DEBUFF_DURATION;
use spacetap_core::{
    format_number, Currency, CurrencyLedger, GameConfig, GameEvent, HeadlessGame, ManualClock,
    MemoryStore, NumberFormatter, Panel, ProgressTracker,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// LEDGER
// =============================================================================

#[test]
fn test_spend_succeeds_iff_balance_covers_amount() {
    let balances = [0.0, 0.5, 1.0, 99.0, 1_000.0, 123_456.75];
    let amounts = [0.25, 1.0, 50.0, 1_000.0, 200_000.0];

    for &balance in &balances {
        for &amount in &amounts {
            let mut ledger = CurrencyLedger::new(MemoryStore::shared());
            ledger.add(Currency::Xenobit, balance);

            let ok = ledger.spend(Currency::Xenobit, amount);
            assert_eq!(ok, balance >= amount, "balance {balance}, amount {amount}");
            let expected = if ok { balance - amount } else { balance };
            assert_eq!(ledger.get(Currency::Xenobit), expected);
        }
    }
}

#[test]
fn test_every_mutation_emits_currency_event() {
    let mut ledger = CurrencyLedger::new(MemoryStore::shared());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    ledger
        .events_mut()
        .subscribe_topic("lunar", move |event| sink.borrow_mut().push(event.clone()));

    ledger.add(Currency::Lunar, 5.0);
    ledger.spend(Currency::Lunar, 2.0);
    ledger.add(Currency::Dilithium, 1.0);

    assert_eq!(
        *seen.borrow(),
        vec![
            GameEvent::CurrencyChanged {
                currency: Currency::Lunar,
                balance: 5.0
            },
            GameEvent::CurrencyChanged {
                currency: Currency::Lunar,
                balance: 3.0
            },
        ]
    );
}

// =============================================================================
// NUMBER DISPLAY
// =============================================================================

#[test]
fn test_display_examples() {
    assert_eq!(format_number(999.0), "999");
    assert_eq!(format_number(1_000.0), "1K");
    assert_eq!(format_number(1_500_000.0), "1.5M");
    assert_eq!(format_number(1e9), "1B");
    assert_eq!(format_number(2.5e12), "2.5T");
}

#[test]
fn test_suffix_exhaustion_uses_scientific_notation() {
    let short = NumberFormatter::new(generate_suffixes().into_iter().take(2).collect());
    assert_eq!(short.format(5e5), "500K");
    assert_eq!(short.format(5e6), "5M");
    assert_eq!(short.format(5e9), "5.00e9");

    let full = NumberFormatter::default();
    assert_eq!(full.suffixes().len(), 4 + 26 * 26);
    assert_eq!(full.format(f64::INFINITY), format!("{:.2e}", f64::INFINITY));
}

// =============================================================================
// UPGRADES AND TRADING
// =============================================================================

#[test]
fn test_upgrade_costs_grow_geometrically() {
    let store = MemoryStore::shared();
    let mut ledger = CurrencyLedger::new(store.clone());
    let mut tracker = ProgressTracker::new(store, Arc::new(ManualClock::new(0)));
    ledger.add(Currency::Dilithium, 10_000.0);

    let mut previous = tracker.upgrades(Panel::Spaceship)[0].cost;
    for level in 1..=5 {
        let upgrade = tracker
            .purchase(Panel::Spaceship, 0, &mut ledger)
            .expect("affordable");
        assert_eq!(upgrade.level, level);
        assert!(upgrade.cost > previous);
        previous = upgrade.cost;
    }
    assert_eq!(ledger.passive_rate(Currency::Dilithium), 5.0);
}

#[tokio::test]
async fn test_trade_is_narrated() {
    let mut game = HeadlessGame::with_clock(
        GameConfig::new().with_typewriter(false),
        Arc::new(ManualClock::new(0)),
    )
    .await
    .expect("game");
    game.ledger_mut().add(Currency::Dilithium, 2_000.0);

    let received = game
        .trade(Currency::Dilithium, Currency::Lunar, 2_000.0)
        .expect("trade");
    assert!((received - 190.0).abs() < 1e-9);
    game.skip_dialogs();

    assert_eq!(
        game.transcript(),
        vec![format!(
            "Trader: Exchanged 2K Dilithium for {} Lunar.",
            format_number(received)
        )]
    );
}

// =============================================================================
// COMBAT
// =============================================================================

#[test]
fn test_defeat_debuff_halves_passive_income() {
    let store = MemoryStore::shared();
    let clock = Arc::new(ManualClock::new(0));
    let mut ledger = CurrencyLedger::new(store.clone());
    let mut tracker = ProgressTracker::new(store, clock.clone());
    ledger.set_passive_rate(Currency::Dilithium, 10.0);

    let mut rng = StdRng::seed_from_u64(4);
    let mut encounter = CombatEncounter::new(
        Combatant::new("Shuttle", 5, 0, 0),
        Combatant::new("Dreadnought", 500, 50, 60),
    );
    let outcome = encounter.resolve(&mut rng);
    assert!(!outcome.is_victory());
    tracker.record_defeat();

    tracker.tick(Duration::from_secs(1), &mut ledger);
    assert_eq!(ledger.get(Currency::Dilithium), 5.0);

    clock.advance(DEBUFF_DURATION);
    tracker.tick(Duration::from_secs(1), &mut ledger);
    assert_eq!(ledger.get(Currency::Dilithium), 15.0);
}

#[tokio::test]
async fn test_headless_fights_update_record() {
    let mut game = HeadlessGame::with_clock(
        GameConfig::new().with_seed(2024).with_typewriter(false),
        Arc::new(ManualClock::new(0)),
    )
    .await
    .expect("game");

    let mut wins = 0;
    for _ in 0..5 {
        if game.fight().is_victory() {
            wins += 1;
        }
    }
    game.skip_dialogs();

    let record = game.progress().progress();
    assert_eq!(record.combat_wins, wins);
    assert_eq!(record.combat_wins + record.combat_losses, 5);
    assert_eq!(game.transcript().len(), 5);
    if wins > 0 {
        assert!(game.balance(Currency::Quark) > 0.0);
    }
}
