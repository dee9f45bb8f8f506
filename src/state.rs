use std::sync::Arc;

use axum::extract::FromRef;
use tracing::info;

use crate::{
    auth::{
        activation::{ActivationNotifier, ActivationWorker},
        jwt::TokenService,
        oauth2::{GoogleProvider, OAuth2Service, ProviderRegistry},
        oauth2_state::MemoryOAuth2StateRepository,
        repo::{MemoryUserRepository, UserReadRepository, UserRepository},
        repo_types::NewUser,
        services::{BasicSignInService, RegisterService},
    },
    config::AppConfig,
    db::{self, PgUserRepository},
    mailer::{LogMailer, Mailer, SmtpMailer},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub users: Arc<dyn UserReadRepository>,
    pub sign_in: Arc<BasicSignInService>,
    pub register: Arc<RegisterService>,
    pub oauth2: Arc<OAuth2Service>,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl AppState {
    /// Picks the user store from the config and starts the activation
    /// worker. The worker stops once every clone of the state is dropped.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, ActivationWorker)> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => {
                info!(host = %smtp.host, port = smtp.port, "activation mail via smtp");
                Arc::new(SmtpMailer::new(smtp)?)
            }
            None => {
                info!("no smtp relay configured; activation mail is logged only");
                Arc::new(LogMailer)
            }
        };

        let mut providers = ProviderRegistry::new();
        if let Some(google) = config.google.clone() {
            providers = providers.with(Arc::new(GoogleProvider::new(google)));
        }
        info!(providers = ?providers.names(), "oauth2 providers");

        match config.database_url.clone() {
            Some(url) => {
                let db = db::connect(&url).await?;
                info!("using postgres user store");
                let repo = Arc::new(PgUserRepository::new(db));
                Ok(Self::build(config, repo, mailer, providers))
            }
            None => {
                let repo = Arc::new(MemoryUserRepository::new());
                if let Some(admin) = &config.seed_admin {
                    let user = NewUser::password_user(&admin.email, &admin.password)?
                        .with_full_name("Administrator")
                        .super_admin()
                        .activated();
                    repo.seed(vec![user]).await?;
                    info!(email = %admin.email, "seeded admin user");
                }
                info!("using in-memory user store");
                Ok(Self::build(config, repo, mailer, providers))
            }
        }
    }

    pub fn build<R>(
        config: AppConfig,
        repo: Arc<R>,
        mailer: Arc<dyn Mailer>,
        providers: ProviderRegistry,
    ) -> (Self, ActivationWorker)
    where
        R: UserRepository + 'static,
    {
        let tokens = TokenService::new(&config.jwt);
        let notifier = ActivationNotifier::new(repo.clone(), mailer, config.activate_url.clone());
        let (queue, worker) = ActivationWorker::spawn(notifier);

        let state = Self {
            sign_in: Arc::new(BasicSignInService::new(repo.clone(), tokens.clone())),
            register: Arc::new(RegisterService::new(
                repo.clone(),
                Arc::new(queue),
                config.registration.clone(),
            )),
            oauth2: Arc::new(OAuth2Service::new(
                repo.clone(),
                Arc::new(MemoryOAuth2StateRepository::new()),
                providers,
                tokens.clone(),
            )),
            users: repo,
            tokens,
            config: Arc::new(config),
        };
        (state, worker)
    }
}
