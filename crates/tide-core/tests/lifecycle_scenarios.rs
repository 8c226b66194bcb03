//! Startup / shutdown scenarios against a shared in-memory tmux server.

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tide_core::{
    derive_session_name, Appearance, KeyAction, KeyTable, LaunchSpec, LifecycleController,
    MemoryMultiplexer, Multiplexer, PlanDefaults, ShutdownOutcome, StartOutcome, WindowPlan,
};

fn launch(mux: &MemoryMultiplexer, pid: u32) -> LifecycleController<MemoryMultiplexer> {
    let name = derive_session_name(None, pid, "ide");
    let plan = WindowPlan::default_for(Path::new("/work"), &PlanDefaults::default())
        .expect("valid plan");
    let spec = LaunchSpec {
        session: name,
        persistent: false,
        cwd: PathBuf::from("/work"),
        program: "tide".to_string(),
        appearance: Appearance::default(),
    };
    LifecycleController::new(mux.clone(), spec, plan).expect("valid controller")
}

fn selects(session: &str, index: u32) -> Option<KeyAction> {
    Some(KeyAction::SelectWindow {
        session: session.to_string(),
        index,
    })
}

#[test]
fn scenario_a_hotkeys_select_windows_of_new_session() {
    let mux = MemoryMultiplexer::new();
    let controller = launch(&mux, 1000);
    assert_eq!(controller.start().expect("start"), StartOutcome::Created);

    assert_eq!(mux.binding(KeyTable::NoPrefix, "F1"), selects("ide-1000", 1));
    assert_eq!(mux.binding(KeyTable::NoPrefix, "F2"), selects("ide-1000", 2));
    assert_eq!(mux.binding(KeyTable::NoPrefix, "F3"), selects("ide-1000", 3));
}

#[test]
fn scenario_b_sequential_launches_never_point_at_previous_session() {
    let mux = MemoryMultiplexer::new();

    let first = launch(&mux, 1000);
    first.start().expect("start");
    assert_eq!(first.shutdown(), ShutdownOutcome::Killed);

    let second = launch(&mux, 2000);
    second.start().expect("start");

    assert_eq!(mux.binding(KeyTable::NoPrefix, "F1"), selects("ide-2000", 1));
    for key in mux.bound_keys() {
        let action = mux.binding(key.table, &key.key).expect("bound");
        assert_ne!(action.session(), Some("ide-1000"), "{} is stale", key);
    }
}

#[test]
fn scenario_c_startup_overwrites_bindings_of_crashed_session() {
    let mux = MemoryMultiplexer::new();

    // Crash: no shutdown, session killed from outside later
    let crashed = launch(&mux, 1000);
    crashed.start().expect("start");
    mux.remove_session("ide-1000");

    let next = launch(&mux, 3000);
    next.start().expect("start");

    assert_eq!(mux.binding(KeyTable::NoPrefix, "F1"), selects("ide-3000", 1));
}

#[test]
fn scenario_d_shutdown_of_absent_session_only_unbinds() {
    let mux = MemoryMultiplexer::new();
    let controller = launch(&mux, 1000);
    controller.start().expect("start");
    mux.remove_session("ide-1000");

    assert_eq!(controller.shutdown(), ShutdownOutcome::AlreadyGone);
    assert!(mux.bound_keys().is_empty());
    assert_eq!(mux.count_commands("kill-session"), 0);
}

#[test]
fn unbind_is_idempotent_for_every_managed_key() {
    let mux = MemoryMultiplexer::new();
    let controller = launch(&mux, 1000);
    controller.start().expect("start");

    assert_eq!(controller.clear_managed_keys(), 0);
    let after_once = mux.bound_keys();
    assert_eq!(controller.clear_managed_keys(), 0);
    assert_eq!(mux.bound_keys(), after_once);
    assert!(after_once.is_empty());
}

#[test]
fn startup_converges_from_arbitrary_stale_state() {
    let mux = MemoryMultiplexer::new();
    let controller = launch(&mux, 4000);

    // Every managed key bound to some dead session
    for (i, key) in controller.registry().all_managed_keys().iter().enumerate() {
        let stale = KeyAction::SelectWindow {
            session: format!("ide-{}", i),
            index: 1,
        };
        mux.bind_key(key.table, &key.key, &stale).expect("bind");
    }

    controller.start().expect("start");

    for key in controller.registry().all_managed_keys() {
        if let Some(action) = mux.binding(key.table, &key.key) {
            let session = action.session();
            assert!(
                session.is_none() || session == Some("ide-4000"),
                "{} still points at {:?}",
                key,
                session
            );
        }
    }
    // Unused hotkeys and retired keys end up unbound
    assert_eq!(mux.binding(KeyTable::NoPrefix, "F9"), None);
    assert_eq!(mux.binding(KeyTable::NoPrefix, "C-w"), None);
    assert_eq!(mux.binding(KeyTable::NoPrefix, "C-p"), None);
}

#[test]
fn shutdown_leaves_nothing_bound_to_destroyed_session() {
    let mux = MemoryMultiplexer::new();
    let controller = launch(&mux, 1000);
    controller.start().expect("start");

    assert_eq!(controller.shutdown(), ShutdownOutcome::Killed);
    assert!(!mux.has_session("ide-1000"));
    for key in controller.registry().all_managed_keys() {
        assert_eq!(mux.binding(key.table, &key.key), None, "{} still bound", key);
    }

    // Unbind happens before kill, both tables included
    let log: Vec<String> = mux.commands().iter().map(|c| c.to_string()).collect();
    let kill = log
        .iter()
        .rposition(|c| c.starts_with("tmux kill-session"))
        .expect("kill issued");
    let last_unbind = log
        .iter()
        .rposition(|c| c == "tmux unbind-key -T root MouseUp1Status")
        .expect("mouse binding retracted");
    assert!(last_unbind < kill);
}

#[test]
fn concurrent_session_loses_hotkeys_to_newer_launch() {
    // Accepted limitation: the key table is global, last writer wins
    let mux = MemoryMultiplexer::new();
    let older = launch(&mux, 1000);
    older.start().expect("start");
    let newer = launch(&mux, 2000);
    newer.start().expect("start");

    assert!(mux.has_session("ide-1000"));
    assert_eq!(mux.binding(KeyTable::NoPrefix, "F1"), selects("ide-2000", 1));

    // And the older session's shutdown strips the newer one's keys
    older.shutdown();
    assert_eq!(mux.binding(KeyTable::NoPrefix, "F1"), None);
    assert!(mux.has_session("ide-2000"));
}

#[test]
fn persistent_session_killed_externally_retracts_every_key() {
    let mux = MemoryMultiplexer::new();
    let plan = WindowPlan::default_for(Path::new("/work"), &PlanDefaults::default())
        .expect("valid plan");
    let spec = LaunchSpec {
        session: "work".to_string(),
        persistent: true,
        cwd: PathBuf::from("/work"),
        program: "tide".to_string(),
        appearance: Appearance::default(),
    };
    let controller = LifecycleController::new(mux.clone(), spec, plan).expect("valid controller");
    assert_eq!(controller.start().expect("start"), StartOutcome::Created);
    assert!(!mux.bound_keys().is_empty());

    mux.remove_session("work");

    assert_eq!(controller.shutdown(), ShutdownOutcome::AlreadyGone);
    assert!(mux.bound_keys().is_empty());
    assert_eq!(mux.count_commands("kill-session"), 0);
    assert_eq!(controller.shutdown(), ShutdownOutcome::AlreadyDone);
}
