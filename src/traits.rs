//! Route grouping.

use crate::app::SchemaApp;

/// A set of routes mounted together under a prefix and tag.
///
/// ```ignore
/// struct Users;
///
/// impl RouteGroup<AppState> for Users {
///     fn prefix() -> &'static str { "/users" }
///     fn tag() -> &'static str { "Users" }
///
///     fn routes(app: SchemaApp<AppState>) -> SchemaApp<AppState> {
///         app.get("/", "List users", list_users)
///            .post("/", "Create a user", create_user)
///     }
/// }
///
/// SchemaApp::new(state).mount::<Users>()
/// ```
pub trait RouteGroup<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// URL prefix prepended to every route of the group.
    fn prefix() -> &'static str {
        ""
    }

    /// OpenAPI tag given to routes that do not declare their own.
    fn tag() -> &'static str {
        "API"
    }

    fn description() -> Option<&'static str> {
        None
    }

    /// Register the group's routes. Paths are relative to `prefix()`.
    fn routes(app: SchemaApp<S>) -> SchemaApp<S>;
}
