//! Request-scoped context threaded through the middleware chain.
//!
//! Replaces a process-global request map with a value owned by the handler:
//! the auth middleware writes the looked-up session and the credential it
//! authenticated with, later links and the upstream forwarder read them
//! through typed accessors. Never mutated after the auth link sets it.

use crate::session::SessionState;

/// Per-request mutable state shared along the chain.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    session: Option<SessionState>,
    auth_value: Option<String>,
}

impl RequestContext {
    /// Attach the session record produced by the key lookup.
    pub fn set_session_data(&mut self, session: SessionState) {
        self.session = Some(session);
    }

    /// The attached session, if an auth link has run.
    #[must_use]
    pub fn session_data(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Attach the credential (key id or token) the request authenticated
    /// with.
    pub fn set_auth_header_value(&mut self, value: String) {
        self.auth_value = Some(value);
    }

    /// The attached credential, if an auth link has run.
    #[must_use]
    pub fn auth_header_value(&self) -> Option<&str> {
        self.auth_value.as_deref()
    }
}
