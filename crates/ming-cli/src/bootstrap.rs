//! Gateway bootstrap orchestrator
//!
//! Brings the gateway up in one forward pass over [`Stage`]s. Every stage up
//! to [`Stage::InstallGlobalLayer`] fails without touching the installed
//! object layer; once the listener is up, a fatal failure stops it before the
//! error is returned. IAM identities load in a supervised background task
//! whose failure is handled by the configured [`IamFailurePolicy`].

use crate::banner::StartupBanner;
use crate::config::{help_entries, EnvOverrides, GatewayConfig, GatewayEnv, IamFailurePolicy, ServerConfig};
use crate::error::{BootstrapError, StageExt};
use crate::net::{check_port_available, validate_gateway_arguments, ListenAddress};
use crate::routes::create_router;
use crate::server::{HttpServer, ServerHandle};
use crate::state::{AppState, IamState, ServerGlobals, ServerInfo};
use crate::subsys::{
    Collaborators, DiskCache, DnsFederator, EventNotifier, IamSys, NotificationSys, ObjectIamSys,
    NOTIFICATION_BACKENDS,
};
use crate::{limits, tls};
use ming_core::{parse_gateway_endpoint, BackendDescriptor, Gateway, GatewayLayer, ObjectLayer};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Bootstrap stages, in the order they run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateArgs,
    LoadTls,
    LoadRootCas,
    InitHelp,
    ResolveListenAddress,
    CheckPortAvailable,
    ApplyEnvOverrides,
    SetResourceLimits,
    BuildServerConfig,
    StartRouterAndListener,
    ConstructBackendLayer,
    DecorateLayer,
    InstallGlobalLayer,
    InitNotification,
    MigrateEncryptedIam,
    InitIam,
    InitDiskCache,
    InitDnsFederation,
    VerifyFeatureSupport,
    PrintStartupBanner,
    AwaitSignal,
    Shutdown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateArgs => "validate arguments",
            Self::LoadTls => "load TLS material",
            Self::LoadRootCas => "load root CAs",
            Self::InitHelp => "register config help",
            Self::ResolveListenAddress => "resolve listen address",
            Self::CheckPortAvailable => "check port availability",
            Self::ApplyEnvOverrides => "apply environment overrides",
            Self::SetResourceLimits => "set resource limits",
            Self::BuildServerConfig => "build server config",
            Self::StartRouterAndListener => "start HTTP listener",
            Self::ConstructBackendLayer => "construct backend layer",
            Self::DecorateLayer => "decorate object layer",
            Self::InstallGlobalLayer => "install object layer",
            Self::InitNotification => "initialize bucket notification",
            Self::MigrateEncryptedIam => "migrate encrypted IAM",
            Self::InitIam => "initialize IAM",
            Self::InitDiskCache => "initialize disk cache",
            Self::InitDnsFederation => "initialize DNS federation",
            Self::VerifyFeatureSupport => "verify feature support",
            Self::PrintStartupBanner => "print startup banner",
            Self::AwaitSignal => "await signal",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages entered so far
#[derive(Debug, Default)]
struct Trail(Vec<Stage>);

impl Trail {
    fn enter(&mut self, stage: Stage) {
        debug!(stage = %stage, "bootstrap stage");
        self.0.push(stage);
    }
}

/// Builder for a gateway run
pub struct Bootstrap {
    config: GatewayConfig,
    gateway: Arc<dyn Gateway>,
    env: Option<GatewayEnv>,
    server_config: Option<ServerConfig>,
    collaborators: Collaborators,
    globals: ServerGlobals,
}

impl Bootstrap {
    pub fn new(config: GatewayConfig, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            config,
            gateway,
            env: None,
            server_config: None,
            collaborators: Collaborators::default(),
            globals: ServerGlobals::new(),
        }
    }

    /// Use these gateway variables instead of reading the process environment
    pub fn with_env(mut self, env: GatewayEnv) -> Self {
        self.env = Some(env);
        self
    }

    /// Use this server configuration instead of loading `MING_*` variables
    pub fn with_server_config(mut self, server_config: ServerConfig) -> Self {
        self.server_config = Some(server_config);
        self
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Handle to the shared globals this run installs into
    pub fn globals(&self) -> ServerGlobals {
        self.globals.clone()
    }

    /// Run every stage up to the startup banner
    pub async fn start(self) -> Result<RunningGateway, BootstrapError> {
        let Bootstrap {
            config,
            gateway,
            env,
            server_config,
            collaborators,
            globals,
        } = self;
        let descriptor = gateway.descriptor();
        let mut trail = Trail::default();

        trail.enter(Stage::ValidateArgs);
        let endpoint = match gateway.endpoint() {
            Some(raw) => {
                let (host, secure) = parse_gateway_endpoint(&raw).stage(Stage::ValidateArgs)?;
                format!("{}://{host}", if secure { "https" } else { "http" })
            }
            None => String::new(),
        };
        validate_gateway_arguments(&config.address, &endpoint).stage(Stage::ValidateArgs)?;

        trail.enter(Stage::LoadTls);
        let tls = tls::load_server_tls(&config.certs_dir).stage(Stage::LoadTls)?;
        let tls_config = tls
            .as_ref()
            .map(|material| material.server_config())
            .transpose()
            .stage(Stage::LoadTls)?;
        let certificates = tls.as_ref().map_or(0, |material| material.cert_count());

        trail.enter(Stage::LoadRootCas);
        let root_cas = tls::load_root_cas(&config.ca_dir()).stage(Stage::LoadRootCas)?;
        debug!(count = root_cas.len(), "trusted CAs loaded");

        trail.enter(Stage::InitHelp);
        let help = help_entries(&descriptor.name);

        trail.enter(Stage::ResolveListenAddress);
        let listen = ListenAddress::resolve(&config.address).stage(Stage::ResolveListenAddress)?;

        trail.enter(Stage::CheckPortAvailable);
        check_port_available(listen.socket_addr).stage(Stage::CheckPortAvailable)?;

        trail.enter(Stage::ApplyEnvOverrides);
        let overrides = env
            .unwrap_or_else(GatewayEnv::from_process)
            .apply()
            .stage(Stage::ApplyEnvOverrides)?;

        trail.enter(Stage::SetResourceLimits);
        limits::raise_open_file_limit();

        trail.enter(Stage::BuildServerConfig);
        let server_config = match server_config {
            Some(server_config) => server_config,
            None => ServerConfig::from_env().stage(Stage::BuildServerConfig)?,
        };

        trail.enter(Stage::StartRouterAndListener);
        let info = ServerInfo::new(
            overrides.deployment_id.clone(),
            &descriptor,
            server_config.region.clone(),
        );
        let state = Arc::new(AppState::new(globals.clone(), info, help).stage(Stage::StartRouterAndListener)?);
        let (server, server_errors) = HttpServer::start(listen.socket_addr, create_router(state), tls_config)
            .stage(Stage::StartRouterAndListener)?;
        globals.set_http_server(server.handle());

        trail.enter(Stage::ConstructBackendLayer);
        let backend = match gateway.new_gateway_layer(overrides.credentials.clone()).await {
            Ok(layer) => layer,
            Err(e) => {
                error!(backend = %descriptor.name, error = %e, "unable to construct backend");
                server.stop().await;
                return Err(BootstrapError::new(Stage::ConstructBackendLayer, e));
            }
        };

        trail.enter(Stage::DecorateLayer);
        let layer = GatewayLayer::wrap(backend);

        trail.enter(Stage::InstallGlobalLayer);
        globals.set_object_layer(Arc::clone(&layer));
        info!(backend = %descriptor.name, "object layer installed");

        let background = CancellationToken::new();
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        let ctx = SubsystemContext {
            config: &config,
            server_config: &server_config,
            overrides: &overrides,
            descriptor: &descriptor,
            collaborators: &collaborators,
            globals: &globals,
            layer: &layer,
            server: server.handle(),
            background: &background,
            fatal_tx,
        };
        let subsystems = match start_subsystems(ctx, &mut trail).await {
            Ok(subsystems) => subsystems,
            Err(e) => {
                error!(stage = %e.stage, error = %e.source, "gateway startup failed");
                background.cancel();
                server.stop().await;
                return Err(e);
            }
        };

        let secure = certificates > 0;
        let advertised = ListenAddress {
            port: server.local_addr().port(),
            ..listen
        };
        if !config.quiet {
            trail.enter(Stage::PrintStartupBanner);
            let banner = StartupBanner {
                backend: &descriptor.name,
                production: descriptor.production,
                endpoints: advertised.endpoints(secure),
                credentials: (!config.anonymous).then_some(&overrides.credentials),
                cache_capacity: subsystems.cache_capacity,
                certificates,
            };
            println!("{}", banner.render());
        }
        if !descriptor.production {
            warn!(backend = %descriptor.name, "backend is not ready for production");
        }

        Ok(RunningGateway {
            server,
            server_errors,
            fatal_rx,
            globals,
            layer,
            dns: collaborators.dns,
            background,
            tasks: subsystems.tasks,
            iam_done: subsystems.iam_done,
            stages: trail.0,
        })
    }
}

struct SubsystemContext<'a> {
    config: &'a GatewayConfig,
    server_config: &'a ServerConfig,
    overrides: &'a EnvOverrides,
    descriptor: &'a BackendDescriptor,
    collaborators: &'a Collaborators,
    globals: &'a ServerGlobals,
    layer: &'a Arc<dyn ObjectLayer>,
    server: ServerHandle,
    background: &'a CancellationToken,
    fatal_tx: mpsc::Sender<BootstrapError>,
}

#[derive(Default)]
struct Subsystems {
    tasks: Vec<JoinHandle<()>>,
    iam_done: Option<oneshot::Receiver<IamState>>,
    cache_capacity: Option<u64>,
}

/// Stages after the object layer is installed
async fn start_subsystems(ctx: SubsystemContext<'_>, trail: &mut Trail) -> Result<Subsystems, BootstrapError> {
    let mut subsystems = Subsystems::default();
    let layer = ctx.layer;

    if NOTIFICATION_BACKENDS.contains(&ctx.descriptor.name.as_str()) {
        trail.enter(Stage::InitNotification);
        let notification: Arc<dyn NotificationSys> = match &ctx.collaborators.notification {
            Some(notification) => Arc::clone(notification),
            None => Arc::new(EventNotifier::new()),
        };
        let buckets = layer.list_buckets().await.stage(Stage::InitNotification)?;
        notification
            .init(&buckets, Arc::clone(layer))
            .await
            .stage(Stage::InitNotification)?;
        ctx.globals.set_notification(notification);
    }

    // Identities must be migrated before IAM reads them
    if let Some(store) = &ctx.collaborators.coordination {
        trail.enter(Stage::MigrateEncryptedIam);
        store
            .migrate_encrypted_iam(Arc::clone(layer), &ctx.overrides.credentials)
            .await
            .stage(Stage::MigrateEncryptedIam)?;
        info!(store = store.name(), "encrypted IAM migration complete");
    }

    if ctx.collaborators.coordination.is_some() || ctx.server_config.iam.enabled {
        trail.enter(Stage::InitIam);
        let iam: Arc<dyn IamSys> = match &ctx.collaborators.iam {
            Some(iam) => Arc::clone(iam),
            None => Arc::new(ObjectIamSys::new()),
        };
        iam.init_store(Arc::clone(layer)).await.stage(Stage::InitIam)?;
        ctx.globals.set_iam_state(IamState::Initializing);

        let (done_tx, done_rx) = oneshot::channel();
        let task = spawn_iam_init(
            iam,
            Arc::clone(layer),
            ctx.globals.clone(),
            ctx.server_config.iam.failure_policy,
            ctx.server.clone(),
            ctx.fatal_tx.clone(),
            ctx.background.clone(),
            done_tx,
        );
        subsystems.tasks.push(task);
        subsystems.iam_done = Some(done_rx);
    }

    if ctx.server_config.cache.enabled() {
        trail.enter(Stage::InitDiskCache);
        let cache = DiskCache::new(&ctx.server_config.cache).stage(Stage::InitDiskCache)?;
        let capacity = cache.capacity();
        info!(drives = cache.drives().len(), quota = cache.quota(), capacity, "disk cache enabled");
        subsystems.cache_capacity = Some(capacity);
        ctx.globals.set_cache_layer(Arc::new(cache));
    }

    if let Some(dns) = &ctx.collaborators.dns {
        trail.enter(Stage::InitDnsFederation);
        sync_dns(dns.as_ref(), layer).await;
    }

    trail.enter(Stage::VerifyFeatureSupport);
    if let Err(e) = verify_feature_support(&ctx) {
        // Federation is already running
        if let Some(dns) = &ctx.collaborators.dns {
            dns.shutdown().await;
        }
        return Err(e);
    }

    debug!(address = %ctx.config.address, "subsystems started");
    Ok(subsystems)
}

/// Backend capabilities required by the environment and server config
fn verify_feature_support(ctx: &SubsystemContext<'_>) -> Result<(), BootstrapError> {
    if let Some(sse) = ctx.overrides.sse.as_ref().filter(|sse| !sse.is_empty()) {
        if !ctx.layer.is_encryption_supported() {
            return Err(BootstrapError::new(
                Stage::VerifyFeatureSupport,
                format!(
                    "server-side encryption ({sse}) requested but the {} backend does not support encryption",
                    ctx.descriptor.name
                ),
            ));
        }
    }
    if ctx.server_config.compression.enabled && !ctx.layer.is_compression_supported() {
        return Err(BootstrapError::new(
            Stage::VerifyFeatureSupport,
            format!(
                "compression enabled but the {} backend does not support compression",
                ctx.descriptor.name
            ),
        ));
    }
    Ok(())
}

async fn sync_dns(dns: &dyn DnsFederator, layer: &Arc<dyn ObjectLayer>) {
    let buckets = match layer.list_buckets().await {
        Ok(buckets) => buckets,
        Err(e) => {
            error!(error = %e, "unable to list buckets for DNS federation");
            return;
        }
    };
    match dns.sync_buckets(&buckets, Arc::clone(layer)).await {
        Ok(()) => info!(buckets = buckets.len(), "DNS federation initialized"),
        Err(e) => error!(error = %format!("{e:#}"), "unable to initialize DNS federation"),
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_iam_init(
    iam: Arc<dyn IamSys>,
    layer: Arc<dyn ObjectLayer>,
    globals: ServerGlobals,
    policy: IamFailurePolicy,
    server: ServerHandle,
    fatal_tx: mpsc::Sender<BootstrapError>,
    cancel: CancellationToken,
    done_tx: oneshot::Sender<IamState>,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = iam.init(layer) => result,
            };

            let state = match result {
                Ok(()) => {
                    info!(users = iam.user_count(), "IAM ready");
                    IamState::Ready
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), policy = ?policy, "unable to initialize IAM");
                    globals.set_iam_state(IamState::Failed);
                    if policy == IamFailurePolicy::Exit {
                        server.shutdown();
                        let _ = fatal_tx.send(BootstrapError::new(Stage::InitIam, e)).await;
                    }
                    IamState::Failed
                }
            };
            globals.set_iam_state(state);
            let _ = done_tx.send(state);
        }
        .in_current_span(),
    )
}

/// A started gateway
pub struct RunningGateway {
    server: HttpServer,
    server_errors: oneshot::Receiver<io::Error>,
    fatal_rx: mpsc::Receiver<BootstrapError>,
    globals: ServerGlobals,
    layer: Arc<dyn ObjectLayer>,
    dns: Option<Arc<dyn DnsFederator>>,
    background: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    iam_done: Option<oneshot::Receiver<IamState>>,
    stages: Vec<Stage>,
}

impl RunningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn globals(&self) -> ServerGlobals {
        self.globals.clone()
    }

    /// Stages that ran, in order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wait for background IAM loading to settle. `None` when IAM is off or already awaited.
    pub async fn wait_iam(&mut self) -> Option<IamState> {
        self.iam_done.take()?.await.ok()
    }

    /// Serve until `shutdown` resolves or a fatal error arrives, then shut down
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), BootstrapError> {
        debug!(stage = %Stage::AwaitSignal, "bootstrap stage");
        let outcome = tokio::select! {
            _ = shutdown => Ok(()),
            Some(err) = self.fatal_rx.recv() => Err(err),
            Ok(err) = &mut self.server_errors => Err(BootstrapError::new(Stage::StartRouterAndListener, err)),
        };
        self.shutdown().await;
        outcome
    }

    /// Stop the listener, background tasks and backend
    pub async fn shutdown(self) {
        debug!(stage = %Stage::Shutdown, "bootstrap stage");
        self.background.cancel();
        self.server.stop().await;
        if let Some(dns) = &self.dns {
            dns.shutdown().await;
        }
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "background task panicked");
            }
        }
        if let Err(e) = self.layer.shutdown().await {
            error!(error = %e, "backend shutdown failed");
        }
        info!("gateway stopped");
    }
}
