//! The session controller: the authentication state machine.
//!
//! Every host event goes through [`SessionController::handle`], which
//! returns the effects the host must apply. The controller owns all mutable
//! state through a single [`SessionCore`], so there is no global state and
//! one `&mut` borrow (or one lock, in the server) covers a whole event.
//!
//! The one exception is key derivation. [`plan_command`] and
//! [`finish_command`] bracket it so a caller can release the borrow while
//! a [`SecretCheck`] runs.
//!
//! [`plan_command`]: SessionController::plan_command
//! [`finish_command`]: SessionController::finish_command

use gatekeep_protocol::{IdentityKey, Notice, Position};
use gatekeep_store::{CredentialRecord, CredentialStore, StoreError, StoreSnapshot};

use crate::check::Outcome;
use crate::{
    AuthConfig, AuthError, CheckedSecret, Clock, CommandPlan, CommandVerb, Effect, HOLDING_BLOCK,
    HostEvent, Persistence, SecretCheck, SessionRegistry, SystemClock, TrustPolicy,
};

/// Lines the controller sends. Public so hosts and tests can match on them.
pub mod notices {
    pub const PROMPT: &str = "[Auth] Please /login <password> or /register <password>";
    pub const AUTO_LOGIN: &str = "[Auth] Auto-logged in.";
    pub const REGISTERED: &str = "[Auth] Registered and logged in!";
    pub const LOGGED_IN: &str = "[Auth] Logged in!";
    pub const TIMED_OUT: &str = "[Auth] Login timed out.";
}

/// All mutable authentication state, owned in one place.
#[derive(Debug)]
pub struct SessionCore {
    pub store: CredentialStore,
    pub registry: SessionRegistry,
}

impl SessionCore {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            registry: SessionRegistry::new(),
        }
    }
}

/// Drives the challenge for every connected identity.
///
/// Generic over [`Clock`] so tests can pin "now"; production code uses the
/// default [`SystemClock`].
#[derive(Debug)]
pub struct SessionController<C: Clock = SystemClock> {
    core: SessionCore,
    config: AuthConfig,
    clock: C,
    persistence: Persistence,
}

impl SessionController<SystemClock> {
    pub fn new(store: CredentialStore, config: AuthConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<C: Clock> SessionController<C> {
    pub fn with_clock(store: CredentialStore, config: AuthConfig, clock: C) -> Self {
        Self {
            core: SessionCore::new(store),
            config,
            clock,
            persistence: Persistence::Inline,
        }
    }

    /// Replaces how the store is written after a successful challenge.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Applies one host event and returns what the host must do.
    ///
    /// Never fails: refused commands become an alert notice for the
    /// identity that sent them.
    pub fn handle(&mut self, event: HostEvent) -> Vec<Effect> {
        match event {
            HostEvent::Connected {
                identity,
                origin,
                position,
            } => self.on_connect(identity, origin, position),
            HostEvent::Disconnected { identity } => {
                self.core.registry.forget(&identity);
                tracing::info!(%identity, "identity disconnected");
                Vec::new()
            }
            HostEvent::MoveAttempt { identity, from, to } => self.on_move(identity, from, to),
            HostEvent::Command {
                identity,
                verb,
                args,
            } => match self.plan_command(&identity, &verb, &args) {
                CommandPlan::Ready(effects) => effects,
                CommandPlan::Check(check) => self.finish_command(check.run()),
            },
        }
    }

    /// First half of a command: validates it against current state and
    /// returns the key derivation still to do, or the refusal.
    ///
    /// Takes `&self`, so other events may be handled before the matching
    /// [`finish_command`](Self::finish_command).
    pub fn plan_command(
        &self,
        identity: &IdentityKey,
        verb: &str,
        args: &[String],
    ) -> CommandPlan {
        let check = verb.parse::<CommandVerb>().and_then(|verb| match verb {
            CommandVerb::Register => self.check_register(identity, args),
            CommandVerb::Login => self.check_login(identity, args),
        });
        match check {
            Ok(check) => CommandPlan::Check(check),
            Err(e) => CommandPlan::Ready(refused(identity, e)),
        }
    }

    /// Second half of a command: re-checks whatever may have changed since
    /// [`plan_command`](Self::plan_command) and commits.
    pub fn finish_command(&mut self, checked: CheckedSecret) -> Vec<Effect> {
        let identity = checked.identity.clone();
        self.commit(checked).unwrap_or_else(|e| refused(&identity, e))
    }

    /// `register <secret>`: creates the record and authenticates.
    ///
    /// # Errors
    /// - [`AuthError::Usage`] unless exactly one argument
    /// - [`AuthError::AlreadyRegistered`] if a record exists
    /// - [`AuthError::NotConnected`] if the identity has no session
    pub fn register(
        &mut self,
        identity: &IdentityKey,
        args: &[String],
    ) -> Result<Vec<Effect>, AuthError> {
        let check = self.check_register(identity, args)?;
        self.commit(check.run())
    }

    /// `login <secret>`: checks the secret and authenticates.
    ///
    /// Accepted while already authenticated; it refreshes the record.
    ///
    /// # Errors
    /// - [`AuthError::Usage`] unless exactly one argument
    /// - [`AuthError::NotRegistered`] if there is no record
    /// - [`AuthError::WrongSecret`] if the secret doesn't match
    /// - [`AuthError::NotConnected`] if the identity has no session
    /// - [`AuthError::Stale`] if the record changed mid-check
    pub fn login(
        &mut self,
        identity: &IdentityKey,
        args: &[String],
    ) -> Result<Vec<Effect>, AuthError> {
        let check = self.check_login(identity, args)?;
        self.commit(check.run())
    }

    /// Kicks identities that have been at the challenge longer than the
    /// store's timeout. Does nothing unless
    /// [`AuthConfig::enforce_challenge_timeout`] is set.
    pub fn expire_pending(&mut self) -> Vec<Effect> {
        if !self.config.enforce_challenge_timeout {
            return Vec::new();
        }

        let now = self.clock.now_millis();
        let timeout = self.core.store.settings().challenge_timeout_millis();
        let expired = self.core.registry.expired_pending(now, timeout);

        expired
            .into_iter()
            .map(|identity| {
                self.core.registry.forget(&identity);
                tracing::info!(%identity, "challenge timed out");
                Effect::Kick {
                    who: identity,
                    reason: notices::TIMED_OUT.to_string(),
                }
            })
            .collect()
    }

    /// Writes the credential store now.
    ///
    /// # Errors
    /// Returns the store's write error; callers decide whether to log it.
    pub fn save(&self) -> Result<(), StoreError> {
        self.core.store.save()
    }

    /// The store as it stands, for writing later.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.core.store.snapshot()
    }

    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.core.registry
    }

    pub fn store(&self) -> &CredentialStore {
        &self.core.store
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy::from_settings(self.core.store.settings())
    }

    // -- Commands ---------------------------------------------------------

    fn check_register(
        &self,
        identity: &IdentityKey,
        args: &[String],
    ) -> Result<SecretCheck, AuthError> {
        let [secret] = args else {
            return Err(AuthError::Usage(CommandVerb::Register));
        };
        if self.core.store.contains(identity) {
            return Err(AuthError::AlreadyRegistered);
        }
        self.connected_origin(identity)?;
        Ok(SecretCheck::register(
            identity.clone(),
            secret.clone(),
            self.config.hash_iterations,
        ))
    }

    fn check_login(
        &self,
        identity: &IdentityKey,
        args: &[String],
    ) -> Result<SecretCheck, AuthError> {
        let [attempt] = args else {
            return Err(AuthError::Usage(CommandVerb::Login));
        };
        let record = self
            .core
            .store
            .get(identity)
            .ok_or(AuthError::NotRegistered)?;
        Ok(SecretCheck::login(
            identity.clone(),
            attempt.clone(),
            record.secret.clone(),
            self.config.hash_iterations,
        ))
    }

    fn commit(&mut self, checked: CheckedSecret) -> Result<Vec<Effect>, AuthError> {
        let CheckedSecret { identity, outcome } = checked;
        match outcome {
            Outcome::Hashed(secret) => {
                // Someone may have registered the name while this hashed.
                if self.core.store.contains(&identity) {
                    return Err(AuthError::AlreadyRegistered);
                }
                let origin = self.connected_origin(&identity)?;

                let now = self.clock.now_millis();
                self.core.store.put(
                    identity.clone(),
                    CredentialRecord::new(secret, origin.clone(), now),
                );
                tracing::info!(%identity, %origin, "identity registered");

                Ok(self.complete_challenge(&identity, &origin, notices::REGISTERED))
            }
            Outcome::Rejected => {
                tracing::info!(%identity, "wrong secret");
                Err(AuthError::WrongSecret)
            }
            Outcome::Verified { against, upgrade } => {
                let record = self
                    .core
                    .store
                    .get(&identity)
                    .ok_or(AuthError::NotRegistered)?;
                if record.secret != against {
                    return Err(AuthError::Stale);
                }
                let origin = self.connected_origin(&identity)?;

                let now = self.clock.now_millis();
                if let Some(record) = self.core.store.get_mut(&identity) {
                    record.touch(&origin, now);
                    if let Some(secret) = upgrade {
                        record.secret = secret;
                        tracing::info!(%identity, "upgraded plaintext secret to hash");
                    }
                }
                tracing::info!(%identity, %origin, "identity logged in");

                Ok(self.complete_challenge(&identity, &origin, notices::LOGGED_IN))
            }
        }
    }

    // -- Transitions ------------------------------------------------------

    fn on_connect(
        &mut self,
        identity: IdentityKey,
        origin: String,
        position: Position,
    ) -> Vec<Effect> {
        if self.core.registry.forget(&identity).is_some() {
            tracing::warn!(%identity, "connect for an identity that never disconnected");
        }

        // Connecting while standing in the holding cell means the last
        // session ended mid-challenge; keep the older return point.
        if position.block() != HOLDING_BLOCK {
            self.core
                .registry
                .save_position(identity.clone(), position.clone());
        }

        let now = self.clock.now_millis();
        let record = self.core.store.get(&identity);
        if self.trust_policy().should_auto_login(record, &origin, now) {
            self.core.registry.mark_authenticated(&identity, &origin);
            tracing::info!(%identity, %origin, "auto-login from trusted origin");
            return vec![notify(&identity, Notice::success(notices::AUTO_LOGIN))];
        }

        if let Err(e) = self.core.registry.mark_pending(&identity, &origin, now) {
            tracing::error!(%identity, error = %e, "could not start challenge");
        }
        tracing::info!(%identity, %origin, "challenge started");

        let holding = Position::at_block(position.world, HOLDING_BLOCK);
        vec![
            Effect::Teleport {
                who: identity.clone(),
                to: holding,
            },
            notify(&identity, Notice::alert(notices::PROMPT)),
        ]
    }

    fn on_move(&mut self, identity: IdentityKey, from: Position, to: Position) -> Vec<Effect> {
        let registry = &self.core.registry;
        let held = registry.is_pending(&identity) && !registry.is_authenticated(&identity);
        if !held || from.same_block(&to) {
            return Vec::new();
        }

        tracing::trace!(%identity, from = %from.block(), to = %to.block(), "move vetoed");
        vec![
            Effect::RejectMove {
                who: identity.clone(),
                back_to: from,
            },
            notify(&identity, Notice::alert(notices::PROMPT)),
        ]
    }

    /// Shared tail of register and login: authenticate, send the identity
    /// back where it was, persist, confirm.
    fn complete_challenge(
        &mut self,
        identity: &IdentityKey,
        origin: &str,
        confirmation: &str,
    ) -> Vec<Effect> {
        self.core.registry.mark_authenticated(identity, origin);

        let mut effects = Vec::with_capacity(2);
        if let Some(position) = self.core.registry.saved_position(identity) {
            effects.push(Effect::Teleport {
                who: identity.clone(),
                to: position.clone(),
            });
        }

        self.persist();
        effects.push(notify(identity, Notice::success(confirmation)));
        effects
    }

    fn connected_origin(&self, identity: &IdentityKey) -> Result<String, AuthError> {
        self.core
            .registry
            .origin(identity)
            .map(str::to_string)
            .ok_or_else(|| AuthError::NotConnected(identity.clone()))
    }

    /// Saves the store, or hands it off. Failures are logged and the
    /// in-memory state stays authoritative.
    fn persist(&self) {
        match &self.persistence {
            Persistence::Inline => {
                if let Err(e) = self.core.store.save() {
                    tracing::error!(error = %e, "failed to persist credential store");
                }
            }
            Persistence::Deferred(sink) => sink(self.core.store.snapshot()),
        }
    }
}

fn refused(identity: &IdentityKey, error: AuthError) -> Vec<Effect> {
    tracing::debug!(%identity, %error, "command refused");
    vec![notify(identity, Notice::alert(error.to_string()))]
}

fn notify(identity: &IdentityKey, notice: Notice) -> Effect {
    Effect::Notify {
        to: identity.clone(),
        notice,
    }
}

// =========================================================================
// Tests
// =========================================================================
