use serde::{Deserialize, Serialize};

/// The staff member editing the inquiry, as reported by the surrounding
/// auth layer. Only the email is needed for audit stamping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub email: String,
}

pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> Actor;
}

/// Fixed-actor provider for tests and single-operator deployments.
#[derive(Clone, Debug)]
pub struct StaticIdentityProvider {
    actor: Actor,
}

impl StaticIdentityProvider {
    pub fn new(email: impl Into<String>) -> Self {
        Self { actor: Actor { email: email.into() } }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_actor(&self) -> Actor {
        self.actor.clone()
    }
}
