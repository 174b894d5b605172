use axum_test::TestServer;
use schema_axum::{
    AppConfig, AppError, ConfigLoader, NoContent, NoSchema, Parts, RouteContext, RouteGroup,
    RouteSpec, SchemaApp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
struct CreateUser {
    /// Display name
    #[validate(length(min = 1))]
    name: String,
    email: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
struct UserId {
    id: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
struct Rename {
    name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
struct Page {
    limit: Option<u32>,
    cursor: Option<String>,
}

async fn create_user(_ctx: RouteContext<()>, input: CreateUser) -> Result<User, AppError> {
    Ok(User {
        id: 1,
        name: input.name,
    })
}

async fn get_user(_ctx: RouteContext<()>, input: UserId) -> Result<User, AppError> {
    Ok(User {
        id: input.id,
        name: "x".into(),
    })
}

async fn list_users(_ctx: RouteContext<()>, _input: Page) -> Result<Vec<User>, AppError> {
    Ok(Vec::new())
}

async fn rename_user(
    _ctx: RouteContext<()>,
    input: Parts<UserId, NoSchema, Rename>,
) -> Result<User, AppError> {
    Ok(User {
        id: input.params.id,
        name: input.body.name,
    })
}

async fn delete_user(_ctx: RouteContext<()>, _input: UserId) -> Result<NoContent, AppError> {
    Ok(NoContent)
}

async fn download(_ctx: RouteContext<()>, _input: NoSchema) -> Result<User, AppError> {
    Ok(User {
        id: 0,
        name: "file".into(),
    })
}

struct Users;

impl RouteGroup<()> for Users {
    fn prefix() -> &'static str {
        "/users"
    }

    fn tag() -> &'static str {
        "Users"
    }

    fn description() -> Option<&'static str> {
        Some("User management")
    }

    fn routes(app: SchemaApp<()>) -> SchemaApp<()> {
        app.get("/", "List users", list_users)
            .post(
                "/",
                RouteSpec::new("Create a user\n\nThe email must be unique.")
                    .status(axum::http::StatusCode::CREATED),
                create_user,
            )
            .get("/:id", "Fetch a user", get_user)
            .put("/:id", "Rename a user", rename_user)
            .delete(
                "/:id",
                RouteSpec::new("Delete a user").operation_id("removeUser").deprecated(),
                delete_user,
            )
    }
}

fn app() -> SchemaApp<()> {
    SchemaApp::new(())
        .info("Users", "2.0.0", "User management API")
        .mount::<Users>()
        .get("/files/:name", "Download a file", download)
}

async fn document() -> Value {
    let server = TestServer::new(app().into_router().unwrap()).unwrap();
    let response = server.get("/openapi.json").await;
    response.assert_status_ok();
    response.json()
}

fn param<'a>(operation: &'a Value, name: &str) -> &'a Value {
    operation["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == name)
        .unwrap_or_else(|| panic!("parameter {name} missing"))
}

#[tokio::test]
async fn test_document_info_and_paths() {
    let doc = document().await;

    assert!(doc["openapi"].as_str().unwrap().starts_with("3."));
    assert_eq!(doc["info"]["title"], "Users");
    assert_eq!(doc["info"]["version"], "2.0.0");

    let paths = doc["paths"].as_object().unwrap();
    let mut keys: Vec<&str> = paths.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["/files/{name}", "/users", "/users/{id}"]);
    assert!(!paths.contains_key("/openapi.json"));
}

#[tokio::test]
async fn test_path_parameters() {
    let doc = document().await;

    let get = &doc["paths"]["/users/{id}"]["get"];
    let id = param(get, "id");
    assert_eq!(id["in"], "path");
    assert_eq!(id["required"], true);
    assert_eq!(id["schema"]["type"], "integer");
    assert_eq!(get["operationId"], "get_users_id");
    assert!(get.get("requestBody").is_none());

    let download = &doc["paths"]["/files/{name}"]["get"];
    let name = param(download, "name");
    assert_eq!(name["in"], "path");
    assert_eq!(name["schema"]["type"], "string");
}

#[tokio::test]
async fn test_query_parameters() {
    let doc = document().await;

    let list = &doc["paths"]["/users"]["get"];
    let limit = param(list, "limit");
    assert_eq!(limit["in"], "query");
    assert_eq!(limit["required"], false);
    assert_eq!(param(list, "cursor")["in"], "query");

    let ok = &list["responses"]["200"]["content"]["application/json"]["schema"];
    assert_eq!(ok["type"], "array");
    let items = &ok["items"];
    assert!(items["$ref"] == "#/components/schemas/User" || items["properties"]["id"].is_object());
}

#[tokio::test]
async fn test_request_body_and_responses() {
    let doc = document().await;

    let create = &doc["paths"]["/users"]["post"];
    assert_eq!(create["summary"], "Create a user");
    assert_eq!(create["description"], "Create a user\n\nThe email must be unique.");
    assert_eq!(
        create["requestBody"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/CreateUser"
    );
    assert_eq!(create["requestBody"]["required"], true);
    assert_eq!(
        create["responses"]["201"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/User"
    );
    for status in ["400", "500"] {
        assert_eq!(
            create["responses"][status]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorResponse"
        );
    }
    assert!(create.get("parameters").is_none());
}

#[tokio::test]
async fn test_split_parts_document() {
    let doc = document().await;

    let put = &doc["paths"]["/users/{id}"]["put"];
    assert_eq!(param(put, "id")["in"], "path");
    assert_eq!(
        put["requestBody"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/Rename"
    );
}

#[tokio::test]
async fn test_no_content_and_overrides() {
    let doc = document().await;

    let delete = &doc["paths"]["/users/{id}"]["delete"];
    assert_eq!(delete["operationId"], "removeUser");
    assert_eq!(delete["deprecated"], true);
    assert!(delete["responses"]["204"].get("content").is_none());
}

#[tokio::test]
async fn test_components_and_tags() {
    let doc = document().await;

    let schemas = doc["components"]["schemas"].as_object().unwrap();
    for name in ["CreateUser", "User", "Rename", "ErrorResponse", "FieldError"] {
        assert!(schemas.contains_key(name), "{name} not in components");
    }
    assert_eq!(
        schemas["CreateUser"]["properties"]["name"]["description"],
        "Display name"
    );

    let tags = doc["tags"].as_array().unwrap();
    let users = tags.iter().find(|t| t["name"] == "Users").unwrap();
    assert_eq!(users["description"], "User management");

    assert_eq!(doc["paths"]["/users/{id}"]["get"]["tags"][0], "Users");
    assert!(doc["paths"]["/files/{name}"]["get"].get("tags").is_none());
}

#[tokio::test]
async fn test_custom_docs_path() {
    let router = app().docs_path("/api/docs.json").into_router().unwrap();
    let server = TestServer::new(router).unwrap();

    server.get("/api/docs.json").await.assert_status_ok();
    server.get("/openapi.json").await.assert_status_not_found();
}

#[cfg(feature = "scalar")]
#[tokio::test]
async fn test_scalar_ui() {
    let server = TestServer::new(app().into_router().unwrap()).unwrap();

    let response = server.get("/scalar").await;
    response.assert_status_ok();
    assert!(response.text().contains("<html"));

    let server = TestServer::new(app().scalar(None).into_router().unwrap()).unwrap();
    server.get("/scalar").await.assert_status_not_found();
}

#[tokio::test]
async fn test_configure_from_toml() {
    let config: AppConfig = ConfigLoader::from_toml(
        r#"
        [docs]
        title = "Configured"
        version = "9.9.9"
        path = "/spec.json"
        "#,
    )
    .unwrap();

    let router = app().configure(&config).into_router().unwrap();
    let server = TestServer::new(router).unwrap();

    let response = server.get("/spec.json").await;
    response.assert_status_ok();
    let doc: Value = response.json();
    assert_eq!(doc["info"]["title"], "Configured");
    assert_eq!(doc["info"]["version"], "9.9.9");
}

mod billing {
    use super::*;

    #[derive(Deserialize, Validate, ToSchema)]
    pub struct Item {
        pub amount: u64,
    }
}

mod catalog {
    use super::*;

    #[derive(Deserialize, Validate, ToSchema)]
    pub struct Item {
        pub title: String,
    }
}

#[test]
fn test_conflicting_schema_names() {
    let result = SchemaApp::new(())
        .schema::<billing::Item>()
        .schema::<catalog::Item>()
        .openapi();

    assert!(matches!(result, Err(AppError::Route(msg)) if msg.contains("Item")));
}

#[test]
fn test_same_schema_registered_twice_is_fine() {
    let openapi = SchemaApp::new(())
        .schema::<User>()
        .get("/me", "Current user", download)
        .openapi()
        .unwrap();

    let json = serde_json::to_value(&openapi).unwrap();
    assert!(json["components"]["schemas"]["User"].is_object());
}
