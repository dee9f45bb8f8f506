use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::auth::{
    activation::ActivationScheduler,
    dto::RegisterInput,
    errors::AuthError,
    jwt::TokenService,
    password::{dummy_verify, verify_password},
    repo::{RepoError, UniqueField, UserReadRepository, UserRepository},
    repo_types::NewUser,
    validation::{check_sign_in, RegistrationPolicy},
};

/// Email + password authentication.
pub struct BasicSignInService {
    users: Arc<dyn UserReadRepository>,
    tokens: TokenService,
}

impl BasicSignInService {
    pub fn new(users: Arc<dyn UserReadRepository>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Returns a signed token. Unknown email and wrong password are both
    /// reported as `NotAuthenticated`.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        check_sign_in(email, password)?;

        let user = match self.users.find_by_email(email).await? {
            Some(u) => u,
            None => {
                warn!(email = %email, "sign in unknown email");
                dummy_verify(password);
                return Err(AuthError::NotAuthenticated);
            }
        };

        if !verify_password(password, &user.hashed_password) {
            warn!(email = %email, user_id = user.id, "sign in invalid password");
            return Err(AuthError::NotAuthenticated);
        }

        if !user.is_active {
            warn!(user_id = user.id, "sign in before activation");
            return Err(AuthError::NotActivated);
        }

        let token = self.tokens.generate_token(&user).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            AuthError::from(e)
        })?;
        info!(user_id = user.id, "user signed in");
        Ok(token)
    }
}

/// Password account registration.
pub struct RegisterService {
    users: Arc<dyn UserRepository>,
    activation: Arc<dyn ActivationScheduler>,
    policy: RegistrationPolicy,
}

impl RegisterService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        activation: Arc<dyn ActivationScheduler>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            users,
            activation,
            policy,
        }
    }

    /// Creates an inactive user and queues its activation email. Returns the
    /// new user id without waiting for the email.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<i64, AuthError> {
        let username = self.policy.check_registration(&input).map_err(|e| {
            warn!(error = %e, "invalid registration");
            AuthError::from(e)
        })?;

        if self.users.find_by_email(&input.email).await?.is_some() {
            warn!("email already registered");
            return Err(AuthError::EmailExisted(input.email));
        }
        if let Some(name) = username.as_deref() {
            if self.users.find_by_username(name).await?.is_some() {
                warn!(username = %name, "username already registered");
                return Err(AuthError::UsernameExisted(name.to_string()));
            }
        }

        let user = NewUser::password_user(&input.email, &input.password)?
            .with_username(username.clone())
            .with_full_name(input.full_name.trim());

        let id = match self.users.create(&user).await {
            Ok(id) => id,
            Err(RepoError::Duplicate(UniqueField::Email)) => {
                return Err(AuthError::EmailExisted(input.email))
            }
            Err(RepoError::Duplicate(UniqueField::Username)) => {
                return Err(AuthError::UsernameExisted(username.unwrap_or_default()))
            }
            Err(e) => {
                error!(error = %e, "create user failed");
                return Err(AuthError::unknown(e));
            }
        };

        self.activation.schedule(id);
        info!(user_id = id, "user registered");
        Ok(id)
    }
}
