//! SchemaApp builder: typed route registration with automatic OpenAPI.
//!
//! Every route registered here is both an axum endpoint and an OpenAPI
//! operation derived from its input and response schemas.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::DefaultBodyLimit;
use axum::routing::{MethodRouter, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;
use utoipa::ToSchema;
use utoipa::openapi::{InfoBuilder, OpenApi};

use crate::config::{AppConfig, ServerConfig};
use crate::docs::{self, DocBuilder, OperationDoc};
use crate::error::{AppError, panic_response};
use crate::input::RequestSchema;
use crate::path;
use crate::route::{self, Method, ResponseSchema, RouteHandler, RouteSpec};
use crate::traits::RouteGroup;

type LayerFn<S> = Box<dyn FnOnce(Router<S>) -> Router<S> + Send>;

/// Builder for schema-first axum applications.
///
/// # Example
/// ```ignore
/// use schema_axum::prelude::*;
///
/// SchemaApp::new(state)
///     .info("My API", "1.0.0", "API description")
///     .get("/users/:id", "Fetch a user", get_user)
///     .post("/users", RouteSpec::new("Create a user").status(StatusCode::CREATED), create_user)
///     .serve("0.0.0.0:8080")
///     .await?;
/// ```
pub struct SchemaApp<S>
where
    S: Clone + Send + Sync + 'static,
{
    state: S,
    routes: BTreeMap<String, MethodRouter<S>>,
    registered: BTreeSet<(String, Method)>,
    docs: DocBuilder,
    docs_path: String,
    scalar_path: Option<String>,
    prefix: String,
    group_tag: Option<String>,
    layers: Vec<LayerFn<S>>,
    errors: Vec<String>,
    has_health_checks: bool,
}

impl<S> SchemaApp<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a new SchemaApp with the given state.
    pub fn new(state: S) -> Self {
        Self {
            state,
            routes: BTreeMap::new(),
            registered: BTreeSet::new(),
            docs: DocBuilder::default(),
            docs_path: "/openapi.json".to_string(),
            scalar_path: cfg!(feature = "scalar").then(|| "/scalar".to_string()),
            prefix: String::new(),
            group_tag: None,
            layers: Vec::new(),
            errors: Vec::new(),
            has_health_checks: false,
        }
    }

    /// Set API info (title, version, description).
    pub fn info(
        mut self,
        title: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.docs.info = InfoBuilder::new()
            .title(title.into())
            .version(version.into())
            .description(Some(description.into()))
            .build();
        self
    }

    /// Add a tag with description.
    pub fn tag(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let name: String = name.into();
        self.docs.add_tag(&name, Some(description.into()));
        self
    }

    /// Register a schema in the document's components without using it in a route.
    pub fn schema<T: ToSchema>(mut self) -> Self {
        self.docs.registry.register::<T>();
        self
    }

    /// Apply documentation, body limit and info settings from configuration.
    pub fn configure(mut self, config: &AppConfig) -> Self {
        self.docs.info = InfoBuilder::new()
            .title(config.docs.title.clone())
            .version(config.docs.version.clone())
            .description(config.docs.description.clone())
            .build();
        self.docs_path = path::normalize(&config.docs.path);
        self.scalar_path = config.docs.scalar_path.as_deref().map(path::normalize);
        self.body_limit(config.server.body_limit)
    }

    /// Register a GET route; input fields not in the path are read from the query string.
    pub fn get<I, R, H>(self, path: &str, spec: impl Into<RouteSpec>, handler: H) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        self.route(Method::Get, path, spec, handler)
    }

    /// Register a PUT route; input fields not in the path are read from the JSON body.
    pub fn put<I, R, H>(self, path: &str, spec: impl Into<RouteSpec>, handler: H) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        self.route(Method::Put, path, spec, handler)
    }

    /// Register a POST route; input fields not in the path are read from the JSON body.
    pub fn post<I, R, H>(self, path: &str, spec: impl Into<RouteSpec>, handler: H) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        self.route(Method::Post, path, spec, handler)
    }

    /// Register a DELETE route; input fields not in the path are read from the query string.
    pub fn delete<I, R, H>(self, path: &str, spec: impl Into<RouteSpec>, handler: H) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        self.route(Method::Delete, path, spec, handler)
    }

    /// Register a PATCH route; input fields not in the path are read from the JSON body.
    pub fn patch<I, R, H>(self, path: &str, spec: impl Into<RouteSpec>, handler: H) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        self.route(Method::Patch, path, spec, handler)
    }

    /// Register a route.
    ///
    /// The input type `I` decides how the request is merged and validated,
    /// the response type `R` how the result is rendered. Both feed the
    /// generated OpenAPI operation. Registering the same method and path
    /// twice, or reusing a placeholder position under another name, is
    /// reported as `AppError::Route` once the app is built.
    ///
    /// # Example
    ///
    /// ```ignore
    /// async fn rename(ctx: RouteContext<AppState>, input: Parts<UserId, NoSchema, Rename>) -> Result<User> {
    ///     ctx.state.users.rename(input.params.id, &input.body.name).await
    /// }
    ///
    /// SchemaApp::new(state).route(Method::Put, "/users/:id", "Rename a user", rename)
    /// ```
    pub fn route<I, R, H>(
        mut self,
        method: Method,
        template: &str,
        spec: impl Into<RouteSpec>,
        handler: H,
    ) -> Self
    where
        I: RequestSchema,
        R: ResponseSchema,
        H: RouteHandler<S, I, R>,
    {
        let path = path::join(&self.prefix, template);
        if !self.registered.insert((path.clone(), method)) {
            self.errors
                .push(format!("{} {} is registered more than once", method, path));
            return self;
        }
        if let Some(existing) = self
            .routes
            .keys()
            .find(|existing| path::placeholders_clash(existing, &path))
        {
            self.errors.push(format!(
                "{} {} conflicts with {}: placeholders at the same position must share a name",
                method, path, existing
            ));
            return self;
        }

        let mut spec = spec.into();
        if spec.tags.is_empty()
            && let Some(tag) = &self.group_tag
        {
            spec.tags.push(tag.clone());
        }
        for tag in &spec.tags {
            self.docs.add_tag(tag, None);
        }

        let path_params = path::params(&path);
        let status = spec.status.unwrap_or_else(R::default_status);
        let shape = I::request_shape(method, &path_params, &mut self.docs.registry);
        let response = R::response_schema(&mut self.docs.registry);

        let operation = docs::operation(
            OperationDoc {
                method,
                path: &path,
                path_params: &path_params,
                spec: &spec,
                shape,
                response,
                status,
            },
            &mut self.docs.registry,
        );
        self.docs.add_operation(method, &path, operation);

        info!("📍 {} {} - {}", method, path, spec.summary_text());

        let router = self.routes.remove(&path).unwrap_or_else(MethodRouter::new);
        self.routes
            .insert(path, route::endpoint::<S, I, R, H>(router, method, status, handler));
        self
    }

    /// Mount a route group under its prefix and tag.
    pub fn mount<G>(mut self) -> Self
    where
        G: RouteGroup<S>,
    {
        let prefix = path::join(&self.prefix, G::prefix());
        let saved_prefix = std::mem::replace(&mut self.prefix, prefix);
        let saved_tag = self.group_tag.replace(G::tag().to_string());
        self.docs
            .add_tag(G::tag(), G::description().map(str::to_string));

        let mut app = G::routes(self);
        app.prefix = saved_prefix;
        app.group_tag = saved_tag;
        app
    }

    /// Serve the OpenAPI JSON at `path` instead of `/openapi.json`.
    pub fn docs_path(mut self, path: &str) -> Self {
        self.docs_path = path::normalize(path);
        self
    }

    /// Serve the Scalar UI at `path`; `None` disables it.
    pub fn scalar(mut self, path: Option<&str>) -> Self {
        self.scalar_path = path.map(path::normalize);
        self
    }

    /// Apply a middleware layer.
    ///
    /// Layers wrap every route, the documentation endpoints included, and are
    /// applied in the order they were added once the router is built.
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: tower::Layer<axum::routing::Route> + Clone + Send + Sync + 'static,
        L::Service: tower::Service<axum::extract::Request> + Clone + Send + Sync + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Future: Send + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Response:
            axum::response::IntoResponse + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Error:
            Into<std::convert::Infallible> + 'static,
    {
        self.layers
            .push(Box::new(move |router: Router<S>| router.layer(layer)));
        self
    }

    /// Add `/health` and `/health/live`, documented under the "Health" tag.
    pub fn health_checks(mut self) -> Self {
        use crate::health::{health, live};

        let saved_prefix = std::mem::take(&mut self.prefix);
        let saved_tag = self.group_tag.take();

        let mut app = self
            .get(
                "/health",
                RouteSpec::new("Basic health check").tag("Health"),
                health::<S>,
            )
            .get(
                "/health/live",
                RouteSpec::new("Liveness probe").tag("Health"),
                live::<S>,
            );

        app.prefix = saved_prefix;
        app.group_tag = saved_tag;
        app.has_health_checks = true;
        app
    }

    /// Enable response compression using gzip, deflate, and brotli.
    pub fn compression(self) -> Self {
        use tower_http::compression::CompressionLayer;

        self.layer(CompressionLayer::new())
    }

    /// Enable structured request logging.
    ///
    /// Should be called after `.request_context()` so the trace span wraps it.
    pub fn request_logging(self) -> Self {
        use crate::middleware::request_logging_middleware;

        self.layer(request_logging_middleware())
    }

    /// Enable request context propagation (correlation ID, request ID, language).
    pub fn request_context(self) -> Self {
        use crate::middleware::request_context_middleware_fn;

        self.layer(axum::middleware::from_fn(request_context_middleware_fn))
    }

    /// Reject request bodies larger than `bytes` with `413`.
    pub fn body_limit(self, bytes: usize) -> Self {
        use tower_http::limit::RequestBodyLimitLayer;

        self.layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(bytes))
    }

    /// Build the OpenAPI document for everything registered so far.
    pub fn openapi(&self) -> crate::Result<OpenApi> {
        if !self.errors.is_empty() {
            return Err(AppError::Route(self.errors.join("; ")));
        }
        self.docs.build()
    }

    /// Build the final router, documentation endpoints included.
    pub fn into_router(self) -> crate::Result<Router> {
        let openapi = self.openapi()?;
        self.assemble(openapi)
    }

    fn assemble(self, openapi: OpenApi) -> crate::Result<Router> {
        if self.routes.contains_key(&self.docs_path) {
            return Err(AppError::Route(format!(
                "documentation path {} is already used by a route",
                self.docs_path
            )));
        }
        if let Some(scalar) = self
            .scalar_path
            .as_deref()
            .filter(|p| self.routes.contains_key(*p))
        {
            return Err(AppError::Route(format!(
                "scalar path {} is already used by a route",
                scalar
            )));
        }

        let mut router = Router::new();
        for (path, method_router) in self.routes {
            router = router.route(&path, method_router);
        }

        let document = openapi.clone();
        router = router.route(
            &self.docs_path,
            get(move || {
                let document = document.clone();
                async move { Json(document) }
            }),
        );

        #[cfg(feature = "scalar")]
        if let Some(scalar) = self.scalar_path {
            use utoipa_scalar::{Scalar, Servable};
            router = router.merge(Scalar::with_url(scalar, openapi));
        }
        #[cfg(not(feature = "scalar"))]
        let _ = (openapi, self.scalar_path);

        for layer in self.layers {
            router = layer(router);
        }
        // outermost, so panics in user layers are caught too
        router = router.layer(CatchPanicLayer::custom(panic_response));

        Ok(router.with_state(self.state))
    }

    /// Serve the application.
    ///
    /// Builds the OpenAPI document, mounts the documentation endpoints and
    /// runs until Ctrl-C.
    pub async fn serve(self, addr: &str) -> crate::Result<()> {
        let openapi = self.openapi()?;

        info!("📚 API: {} v{}", openapi.info.title, openapi.info.version);
        if let Some(ref desc) = openapi.info.description {
            info!("   {}", desc);
        }
        for (path, item) in &openapi.paths.paths {
            let methods: Vec<_> = [
                item.get.as_ref().map(|_| "GET"),
                item.post.as_ref().map(|_| "POST"),
                item.put.as_ref().map(|_| "PUT"),
                item.delete.as_ref().map(|_| "DELETE"),
                item.patch.as_ref().map(|_| "PATCH"),
            ]
            .into_iter()
            .flatten()
            .collect();
            info!("   {} [{}]", path, methods.join(", "));
        }

        let docs_path = self.docs_path.clone();
        let scalar_path = self.scalar_path.clone();
        let has_health_checks = self.has_health_checks;
        let router = self.assemble(openapi)?;

        let listener = TcpListener::bind(addr).await?;

        info!("🚀 Server listening on http://{}", addr);
        info!("📚 Available endpoints:");
        info!("   - OpenAPI: http://{}{}", addr, docs_path);
        if let Some(scalar) = scalar_path.filter(|_| cfg!(feature = "scalar")) {
            info!("   - Scalar: http://{}{}", addr, scalar);
        }
        if has_health_checks {
            info!("   - Health Checks: http://{}/health", addr);
        }

        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("👋 Server stopped");
        Ok(())
    }

    /// Serve on the host and port from configuration.
    pub async fn serve_with(self, config: &ServerConfig) -> crate::Result<()> {
        self.serve(&config.addr()).await
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
