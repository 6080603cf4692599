//! End-to-end authentication flows through `SessionController`, with a real
//! store file on disk and a manual clock.

use gatekeep_protocol::{IdentityKey, Notice, Position};
use gatekeep_session::{
    AuthConfig, AuthError, Effect, HostEvent, ManualClock, SessionController, notices,
};
use gatekeep_store::{CredentialStore, StoredSecret};

const T0: u64 = 1_700_000_000_000;
const HOUR: u64 = 60 * 60 * 1000;

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    _dir: tempfile::TempDir,
    path: std::path::PathBuf,
    clock: ManualClock,
    ctl: SessionController<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeep").join("auth.yml");
        let clock = ManualClock::new(T0);
        let ctl = SessionController::with_clock(
            CredentialStore::open(&path),
            AuthConfig {
                hash_iterations: 8,
                ..AuthConfig::default()
            },
            clock.clone(),
        );
        Self {
            _dir: dir,
            path,
            clock,
            ctl,
        }
    }

    /// Simulates a process restart: a new controller reading the same file.
    fn restart(&mut self) {
        self.ctl = SessionController::with_clock(
            CredentialStore::open(&self.path),
            self.ctl.config().clone(),
            self.clock.clone(),
        );
    }

    fn connect(&mut self, name: &str, origin: &str, at: Position) -> Vec<Effect> {
        self.ctl.handle(HostEvent::Connected {
            identity: IdentityKey::new(name),
            origin: origin.into(),
            position: at,
        })
    }

    fn disconnect(&mut self, name: &str) {
        self.ctl.handle(HostEvent::Disconnected {
            identity: IdentityKey::new(name),
        });
    }

    fn command(&mut self, name: &str, verb: &str, args: &[&str]) -> Vec<Effect> {
        self.ctl.handle(HostEvent::Command {
            identity: IdentityKey::new(name),
            verb: verb.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn bob() -> IdentityKey {
    IdentityKey::new("bob")
}

fn spawn_point() -> Position {
    Position::new("world", 10.0, 64.0, 10.0)
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn test_fresh_identity_registers_and_returns_to_saved_position() {
    let mut h = Harness::new();

    let on_connect = h.connect("Bob", "9.9.9.9", spawn_point());
    assert_eq!(
        on_connect,
        vec![
            Effect::Teleport {
                who: bob(),
                to: Position::new("world", 0.0, 100.0, 0.0),
            },
            Effect::Notify {
                to: bob(),
                notice: Notice::alert(notices::PROMPT),
            },
        ]
    );
    assert!(h.ctl.registry().is_pending(&bob()));

    let on_register = h.command("Bob", "register", &["secretA"]);
    assert_eq!(
        on_register,
        vec![
            Effect::Teleport {
                who: bob(),
                to: spawn_point(),
            },
            Effect::Notify {
                to: bob(),
                notice: Notice::success(notices::REGISTERED),
            },
        ]
    );
    assert!(h.ctl.registry().is_authenticated(&bob()));

    let text = std::fs::read_to_string(&h.path).expect("store persisted");
    let record_lines: Vec<&str> = text.lines().filter(|l| l.contains(" : ")).collect();
    assert_eq!(record_lines.len(), 1);
    assert!(record_lines[0].starts_with("bob : \""));
    assert!(record_lines[0].ends_with(&format!(" : 9.9.9.9 : {T0}")));
}

#[test]
fn test_reconnect_inside_trust_window_auto_logs_in() {
    let mut h = Harness::new();
    h.connect("Bob", "9.9.9.9", spawn_point());
    h.command("Bob", "register", &["secretA"]);
    h.disconnect("Bob");
    h.clock.advance(HOUR);

    let effects = h.connect("bob", "9.9.9.9", spawn_point());

    assert_eq!(
        effects,
        vec![Effect::Notify {
            to: bob(),
            notice: Notice::success(notices::AUTO_LOGIN),
        }]
    );
    assert!(h.ctl.registry().is_authenticated(&bob()));
    assert_eq!(h.ctl.registry().saved_position(&bob()), Some(&spawn_point()));
}

#[test]
fn test_reconnect_after_trust_window_is_challenged() {
    let mut h = Harness::new();
    h.connect("Bob", "9.9.9.9", spawn_point());
    h.command("Bob", "register", &["secretA"]);
    h.disconnect("Bob");
    h.clock.advance(12 * HOUR);

    let effects = h.connect("Bob", "9.9.9.9", spawn_point());

    assert_eq!(effects.len(), 2);
    assert!(h.ctl.registry().is_pending(&bob()));
}

#[test]
fn test_reconnect_from_new_origin_then_login_moves_trust() {
    let mut h = Harness::new();
    h.connect("Bob", "9.9.9.9", spawn_point());
    h.command("Bob", "register", &["secretA"]);
    h.disconnect("Bob");

    h.connect("Bob", "5.6.7.8", spawn_point());
    assert!(h.ctl.registry().is_pending(&bob()));

    let wrong = h.command("Bob", "login", &["wrongpass"]);
    assert_eq!(
        wrong,
        vec![Effect::Notify {
            to: bob(),
            notice: Notice::alert(AuthError::WrongSecret.to_string()),
        }]
    );
    assert!(h.ctl.registry().is_pending(&bob()));

    let right = h.command("Bob", "login", &["secretA"]);
    assert_eq!(
        right.last(),
        Some(&Effect::Notify {
            to: bob(),
            notice: Notice::success(notices::LOGGED_IN),
        })
    );
    assert_eq!(h.ctl.store().get(&bob()).unwrap().last_origin, "5.6.7.8");

    // The new origin is now the trusted one.
    h.disconnect("Bob");
    h.connect("Bob", "5.6.7.8", spawn_point());
    assert!(h.ctl.registry().is_authenticated(&bob()));
}

#[test]
fn test_records_survive_restart() {
    let mut h = Harness::new();
    h.connect("Amy", "1.1.1.1", spawn_point());
    h.command("Amy", "register", &["pw-amy"]);
    h.connect("Bob", "2.2.2.2", spawn_point());
    h.command("Bob", "register", &["pw-bob"]);

    h.restart();

    assert_eq!(h.ctl.store().len(), 2);
    let amy = h.ctl.store().get(&IdentityKey::new("amy")).unwrap();
    assert!(amy.secret.verify("pw-amy"));
    assert_eq!(amy.last_origin, "1.1.1.1");
    assert_eq!(amy.last_success_at, T0);
    assert!(h.ctl.registry().is_empty(), "sessions are not persisted");
}

#[test]
fn test_legacy_plaintext_file_logs_in_and_is_rewritten_hashed() {
    let mut h = Harness::new();
    std::fs::create_dir_all(h.path.parent().unwrap()).unwrap();
    std::fs::write(
        &h.path,
        "login time out:120sec\nip cache time:12hrs\n\nregistered players\nbob : \"hunter2\" : 3.3.3.3 : 0\n",
    )
    .unwrap();
    h.restart();
    assert!(h.ctl.store().get(&bob()).unwrap().secret.is_legacy());

    // Epoch-zero timestamp: never trusted, even from the same origin.
    h.connect("bob", "3.3.3.3", spawn_point());
    assert!(h.ctl.registry().is_pending(&bob()));
    h.command("bob", "login", &["hunter2"]);

    let text = std::fs::read_to_string(&h.path).unwrap();
    assert!(!text.contains("hunter2"));
    assert!(text.contains("$pbkdf2-sha256$"));
}

#[test]
fn test_pending_identity_is_pinned_until_authenticated() {
    let mut h = Harness::new();
    h.connect("Bob", "9.9.9.9", spawn_point());
    let cell = Position::new("world", 0.5, 100.0, 0.5);
    let step = Position::new("world", 1.5, 100.0, 0.5);

    let vetoed = h.ctl.handle(HostEvent::MoveAttempt {
        identity: bob(),
        from: cell.clone(),
        to: step.clone(),
    });
    assert!(matches!(vetoed.first(), Some(Effect::RejectMove { back_to, .. }) if *back_to == cell));

    h.command("Bob", "register", &["pw"]);
    let allowed = h.ctl.handle(HostEvent::MoveAttempt {
        identity: bob(),
        from: cell,
        to: step,
    });
    assert!(allowed.is_empty());
}

#[test]
fn test_disconnect_clears_session_but_keeps_record() {
    let mut h = Harness::new();
    h.connect("Bob", "9.9.9.9", spawn_point());
    h.command("Bob", "register", &["pw"]);

    h.disconnect("BOB");

    assert!(h.ctl.registry().get(&bob()).is_none());
    assert!(h.ctl.store().contains(&bob()));
}

#[test]
fn test_unwritable_store_keeps_memory_authoritative() {
    let dir = tempfile::tempdir().unwrap();
    // The store's parent "directory" is a regular file, so every save fails.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let clock = ManualClock::new(T0);
    let mut ctl = SessionController::with_clock(
        CredentialStore::new(blocker.join("auth.yml")),
        AuthConfig {
            hash_iterations: 1,
            ..AuthConfig::default()
        },
        clock,
    );
    ctl.handle(HostEvent::Connected {
        identity: bob(),
        origin: "9.9.9.9".into(),
        position: spawn_point(),
    });

    let effects = ctl.handle(HostEvent::Command {
        identity: bob(),
        verb: "register".into(),
        args: vec!["pw".into()],
    });

    assert!(matches!(
        effects.last(),
        Some(Effect::Notify { notice, .. }) if notice.text == notices::REGISTERED
    ));
    assert!(ctl.registry().is_authenticated(&bob()));
    assert!(ctl.save().is_err());
    assert!(matches!(
        ctl.store().get(&bob()).map(|r| &r.secret),
        Some(StoredSecret::Hashed { .. })
    ));
}
