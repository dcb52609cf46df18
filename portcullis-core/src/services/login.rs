//! The login flow wrapped around the throttle.
//!
//! A submission walks these steps and stops at the first one that fails:
//!
//! | Step               | Failure                          | Attempt recorded |
//! | ------------------ | -------------------------------- | ---------------- |
//! | validate input     | [`LoginMessage::InvalidInput`]   | no               |
//! | lockout check      | [`LoginMessage::LockedOut`]      | no               |
//! | verify credentials | [`LoginMessage::InvalidCredentials`] | `incorrect`  |
//! | account active     | [`LoginMessage::AccountInactive`] | `inactive`      |
//! | email verified     | [`LoginMessage::AccountUnverified`] | `unverified`  |
//! | establish session  | [`LoginMessage::ServiceUnavailable`] | success, once established |
//!
//! The lockout check runs before the password is looked at, so a locked
//! account stays locked even for the right password. After every recorded
//! failure the lockout is evaluated again, and a failure that just tripped a
//! lockout is reported as [`LoginMessage::LockedOut`].
//!
//! The service never touches cookies, redirects or flash messages. It returns
//! a [`LoginOutcome`] and the caller applies it.

use std::{fmt, sync::Arc};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::{
    Error, Session, User, UserId,
    config::LoginConfig,
    error::ValidationError,
    repositories::{
        LoginAttemptRepository, PasswordRepository, RememberTokenRepository, SessionRepository,
        UserRepository,
    },
    services::{
        PasswordService, RememberTokenService, SessionService, ThrottleService, UserService,
    },
    session::{RememberToken, SessionToken},
    storage::{FailureReason, LockoutScope, LockoutStatus, NewLoginAttempt, UNKNOWN},
    validation::{validate_login_email, validate_login_password},
};

/// A login form submission.
#[derive(Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: SecretString,
    /// Issue a remember-me token on success
    pub remember: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
            remember: false,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Form field named in an input error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginField {
    Email,
    Password,
}

impl fmt::Display for LoginField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginField::Email => f.write_str("email"),
            LoginField::Password => f.write_str("password"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputProblem {
    Missing,
    TooLong,
    NotAnEmail,
}

/// User-facing result of a login step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoginMessage {
    Welcome,
    InvalidInput {
        field: LoginField,
        problem: InputProblem,
    },
    LockedOut {
        scope: LockoutScope,
        minutes: i64,
    },
    InvalidCredentials,
    AccountInactive,
    AccountUnverified,
    ServiceUnavailable,
}

impl fmt::Display for LoginMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMessage::Welcome => f.write_str("Login successful! Welcome!"),
            LoginMessage::InvalidInput { field, problem } => match problem {
                InputProblem::Missing => write!(f, "Please enter an input in the {field} field!"),
                InputProblem::TooLong => write!(f, "The input of the {field} field is too long!"),
                InputProblem::NotAnEmail => write!(
                    f,
                    "The input in the {field} field is not a valid email address!"
                ),
            },
            LoginMessage::LockedOut {
                scope: LockoutScope::User,
                minutes,
            } => write!(
                f,
                "Your account is locked due to too many failed login attempts. Please wait {minutes} minute(s) before trying again."
            ),
            LoginMessage::LockedOut {
                scope: LockoutScope::Ip,
                minutes,
            } => write!(
                f,
                "Access from your IP address is temporarily blocked due to too many failed login attempts. Please wait {minutes} minute(s) before trying again."
            ),
            LoginMessage::InvalidCredentials => {
                f.write_str("Invalid email or password. Please try again.")
            }
            LoginMessage::AccountInactive => f.write_str(
                "Your account is inactive! Contact an administrator for more information!",
            ),
            LoginMessage::AccountUnverified => f.write_str(
                "Your account has not been verified! Check your email for the verification link!",
            ),
            LoginMessage::ServiceUnavailable => {
                f.write_str("Error! Something went wrong! Please try again or contact an admin.")
            }
        }
    }
}

impl From<FailureReason> for LoginMessage {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Incorrect => LoginMessage::InvalidCredentials,
            FailureReason::Inactive => LoginMessage::AccountInactive,
            FailureReason::Unverified => LoginMessage::AccountUnverified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: User,
    pub session: Session,
    pub remember_token: Option<RememberToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRejection {
    pub message: LoginMessage,
    /// Set when the rejection is a lockout
    pub retry_after: Option<Duration>,
}

impl LoginRejection {
    fn new(message: LoginMessage) -> Self {
        Self {
            message,
            retry_after: None,
        }
    }

    fn locked_out(lockout: &LockoutStatus) -> Self {
        Self {
            message: LoginMessage::LockedOut {
                scope: lockout.scope,
                minutes: lockout.minutes_remaining,
            },
            retry_after: Some(Duration::seconds(lockout.seconds_remaining)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(LoginSuccess),
    Rejected(LoginRejection),
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated(_))
    }

    pub fn message(&self) -> LoginMessage {
        match self {
            LoginOutcome::Authenticated(_) => LoginMessage::Welcome,
            LoginOutcome::Rejected(rejection) => rejection.message.clone(),
        }
    }
}

impl From<LoginRejection> for LoginOutcome {
    fn from(rejection: LoginRejection) -> Self {
        LoginOutcome::Rejected(rejection)
    }
}

fn validate_input(email: &str, password: &str) -> Result<(), LoginMessage> {
    let invalid = |field, error: ValidationError| {
        let problem = match error {
            ValidationError::MissingField(_) => InputProblem::Missing,
            ValidationError::InvalidEmail(_) => InputProblem::NotAnEmail,
            _ => InputProblem::TooLong,
        };
        LoginMessage::InvalidInput { field, problem }
    };

    validate_login_email(email).map_err(|e| invalid(LoginField::Email, e))?;
    validate_login_password(password).map_err(|e| invalid(LoginField::Password, e))?;
    Ok(())
}

/// Runs login submissions against the throttle and the identity store.
pub struct LoginService<U, P, A, S, T>
where
    U: UserRepository,
    P: PasswordRepository,
    A: LoginAttemptRepository,
    S: SessionRepository,
    T: RememberTokenRepository,
{
    users: Arc<UserService<U>>,
    passwords: Arc<PasswordService<P>>,
    attempts: Arc<A>,
    throttle: Arc<ThrottleService<A>>,
    sessions: Arc<SessionService<S>>,
    remember_tokens: Arc<RememberTokenService<T, U>>,
    config: LoginConfig,
}

impl<U, P, A, S, T> LoginService<U, P, A, S, T>
where
    U: UserRepository,
    P: PasswordRepository,
    A: LoginAttemptRepository,
    S: SessionRepository,
    T: RememberTokenRepository,
{
    /// `attempts` must be the log `throttle` reads from.
    pub fn new(
        users: Arc<UserService<U>>,
        passwords: Arc<PasswordService<P>>,
        attempts: Arc<A>,
        throttle: Arc<ThrottleService<A>>,
        sessions: Arc<SessionService<S>>,
        remember_tokens: Arc<RememberTokenService<T, U>>,
        config: LoginConfig,
    ) -> Self {
        Self {
            users,
            passwords,
            attempts,
            throttle,
            sessions,
            remember_tokens,
            config,
        }
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Process one login submission.
    pub async fn login(&self, request: LoginRequest) -> LoginOutcome {
        let email = request.email.trim();
        if let Err(message) = validate_input(email, request.password.expose_secret()) {
            return LoginRejection::new(message).into();
        }

        let ip_address = request.ip_address.as_deref().unwrap_or(UNKNOWN);
        let user_agent = request.user_agent.as_deref().unwrap_or(UNKNOWN);

        match self
            .authenticate(email, &request, ip_address, user_agent)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, email, ip_address, "Login aborted by a storage failure");
                LoginRejection::new(LoginMessage::ServiceUnavailable).into()
            }
        }
    }

    async fn authenticate(
        &self,
        email: &str,
        request: &LoginRequest,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<LoginOutcome, Error> {
        let user = self.users.get_user_by_email(email).await?;
        let user_id = user.as_ref().map(|user| user.id.clone());

        if let Some(lockout) = self.throttle.check_login(user_id.as_ref(), ip_address).await? {
            tracing::warn!(
                scope = %lockout.scope,
                minutes = lockout.minutes_remaining,
                email,
                ip_address,
                "Login blocked by lockout"
            );
            return Ok(LoginRejection::locked_out(&lockout).into());
        }

        let Some(user) = user else {
            return Ok(self
                .reject(None, ip_address, user_agent, FailureReason::Incorrect)
                .await);
        };

        if !self.passwords.verify(&user.id, &request.password).await? {
            return Ok(self
                .reject(Some(user.id), ip_address, user_agent, FailureReason::Incorrect)
                .await);
        }

        if !user.can_sign_in() {
            return Ok(self
                .reject(Some(user.id), ip_address, user_agent, FailureReason::Inactive)
                .await);
        }

        if self.config.require_verified_email && !user.is_email_verified() {
            return Ok(self
                .reject(Some(user.id), ip_address, user_agent, FailureReason::Unverified)
                .await);
        }

        let session = self
            .sessions
            .create_session(&user.id, user_agent, ip_address)
            .await?;
        let remember_token = if request.remember {
            match self.remember_tokens.issue(&user.id).await {
                Ok(token) => Some(token),
                Err(e) => {
                    // The submission is rejected, so the session must not outlive it
                    if let Err(cleanup) = self.sessions.delete_session(&session.token).await {
                        tracing::error!(error = %cleanup, user_id = %user.id, "Failed to discard session");
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.record(NewLoginAttempt::succeeded(
            user.id.clone(),
            ip_address,
            user_agent,
        ))
        .await;

        tracing::info!(user_id = %user.id, ip_address, "Login successful");
        Ok(LoginOutcome::Authenticated(LoginSuccess {
            user,
            session,
            remember_token,
        }))
    }

    /// Record a failed attempt and pick the message to show for it.
    async fn reject(
        &self,
        user_id: Option<UserId>,
        ip_address: &str,
        user_agent: &str,
        reason: FailureReason,
    ) -> LoginOutcome {
        self.record(NewLoginAttempt::failed(
            user_id.clone(),
            ip_address,
            user_agent,
            reason,
        ))
        .await;
        tracing::info!(%reason, ip_address, "Login attempt failed");

        match self.throttle.check_login(user_id.as_ref(), ip_address).await {
            Ok(Some(lockout)) => {
                tracing::warn!(
                    scope = %lockout.scope,
                    minutes = lockout.minutes_remaining,
                    ip_address,
                    "Failed attempt triggered a lockout"
                );
                LoginRejection::locked_out(&lockout).into()
            }
            Ok(None) => LoginRejection::new(reason.into()).into(),
            Err(e) => {
                tracing::error!(error = %e, ip_address, "Failed to re-check lockout");
                LoginRejection::new(reason.into()).into()
            }
        }
    }

    /// Append to the attempt log. A failed write does not change the outcome.
    async fn record(&self, attempt: NewLoginAttempt) {
        let success = attempt.is_success();
        if let Err(e) = self.attempts.record(attempt).await {
            tracing::error!(error = %e, success, "Failed to record login attempt");
        }
    }

    /// Lockout currently applying to `email` from `ip_address`, for rendering
    /// the login page before anything is submitted.
    pub async fn lockout_status(
        &self,
        email: &str,
        ip_address: &str,
    ) -> Result<Option<LockoutStatus>, Error> {
        let user_id = self.users.resolve_user_id(email.trim()).await?;
        self.throttle.check_login(user_id.as_ref(), ip_address).await
    }

    /// Sign in with a remember-me token instead of a password.
    pub async fn resume(
        &self,
        token: &RememberToken,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Option<LoginSuccess>, Error> {
        let Some(user) = self.remember_tokens.redeem(token).await? else {
            return Ok(None);
        };

        let session = self
            .sessions
            .create_session(&user.id, user_agent, ip_address)
            .await?;

        tracing::info!(user_id = %user.id, ip_address, "Session resumed from remember token");
        Ok(Some(LoginSuccess {
            user,
            session,
            remember_token: Some(token.clone()),
        }))
    }

    /// End a session and forget the user's remember-me token.
    pub async fn logout(&self, token: &SessionToken) -> Result<(), Error> {
        if let Some(session) = self.sessions.get_session(token).await? {
            self.remember_tokens.revoke(&session.user_id).await?;
        }
        self.sessions.delete_session(token).await
    }
}
