//! Service layer for business logic
//!
//! Services are generic over the repository traits they need and are shared
//! through `Arc`. [`LoginService`] drives the login flow on top of the others.

pub mod login;
pub mod password;
pub mod remember;
pub mod session;
pub mod throttle;
pub mod user;

#[cfg(test)]
pub(crate) mod mock;

pub use login::{
    InputProblem, LoginField, LoginMessage, LoginOutcome, LoginRejection, LoginRequest,
    LoginService, LoginSuccess,
};
pub use password::PasswordService;
pub use remember::RememberTokenService;
pub use session::SessionService;
pub use throttle::ThrottleService;
pub use user::UserService;
