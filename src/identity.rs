/**
 * The identity gateway, or at least our end of it.
 *
 * This service never checks a password. Deployments put it behind an
 * authenticating reverse proxy which resolves the session and forwards the
 * result in `x-auth-*` headers; everything here just reads those headers
 * into a value the rest of the code can carry around explicitly.
 */
use log::*;
use tide::Request;
use uuid::Uuid;

use crate::errors::PollError;

/**
 * Role attached to an authenticated account, decided upstream.
 *
 * Admins may mutate any poll regardless of ownership.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

/**
 * An authenticated caller
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
}

/**
 * The resolved caller of a request
 */
#[derive(Clone, Debug, PartialEq)]
pub enum Identity {
    Anonymous,
    Authenticated(Account),
}

impl Identity {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(account) => Some(account),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.account().is_none()
    }
}

fn header_value<'r, State>(req: &'r Request<State>, name: &str) -> Option<&'r str> {
    req.header(name).map(|values| values.last().as_str())
}

/**
 * Resolve the caller of this request.
 *
 * A missing or malformed id header degrades to Anonymous rather than
 * failing the request; unauthenticated access is legal for most routes.
 */
pub fn current_identity<State>(req: &Request<State>) -> Identity {
    let id = match header_value(req, "x-auth-id") {
        Some(id) => id,
        None => return Identity::Anonymous,
    };

    let id = match Uuid::parse_str(id) {
        Ok(id) => id,
        Err(_) => {
            warn!("Discarding unparseable x-auth-id header: {:?}", id);
            return Identity::Anonymous;
        }
    };

    let role = match header_value(req, "x-auth-role") {
        Some("admin") => Role::Admin,
        _ => Role::Member,
    };

    let email = header_value(req, "x-auth-email").unwrap_or("").to_string();

    Identity::Authenticated(Account { id, role, email })
}

/**
 * Resolve the caller, refusing anonymous access
 */
pub fn require_authenticated<State>(req: &Request<State>) -> Result<Account, PollError> {
    match current_identity(req) {
        Identity::Authenticated(account) => Ok(account),
        Identity::Anonymous => Err(PollError::NotAuthenticated),
    }
}
