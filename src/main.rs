use actix_web::{delete, error, get, post, web, App, HttpResponse, HttpServer, Responder, Result};
use chrono::{DateTime, Utc};
use iot_relay::buffer::{spawn_sweeper, Message, MessageBuffer};
use iot_relay::clock::{Clock, SystemClock};
use iot_relay::repository::entities::CommandRecord;
use iot_relay::repository::interface::CommandRepository;
use iot_relay::repository::Repository;
use iot_relay::settings::Setup;
use iot_relay::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use web::{Data, Json};

/// VERSION shall be updated before creating release.
static VERSION: &str = "IoT Relay 0.1.0";

static ROUTES: [&str; 10] = [
    "/version",
    "/commands (GET, POST)",
    "/commands/{id} (DELETE)",
    "/all_commands",
    "/last_command",
    "/last_command_json",
    "/esp_message (POST)",
    "/messages",
    "/status",
    "/",
];

#[derive(Debug, Serialize, Deserialize)]
struct Version {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommandInput {
    command: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageInput {
    device_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct CommandsOutput {
    success: bool,
    count: usize,
    commands: Vec<CommandRecord>,
}

#[derive(Debug, Serialize)]
struct MessagesOutput {
    success: bool,
    count: usize,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct LastCommand {
    value: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    service: String,
    status: &'static str,
    commands_stored: usize,
    messages_in_memory: usize,
    routes_available: &'static [&'static str],
    timestamp: DateTime<Utc>,
}

struct ServerActor<T>
where
    T: CommandRepository + 'static,
{
    version: String,
    repo: Arc<T>,
    buffer: Arc<MessageBuffer>,
}

impl<T> Clone for ServerActor<T>
where
    T: CommandRepository + 'static,
{
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            repo: self.repo.clone(),
            buffer: self.buffer.clone(),
        }
    }
}

/// Maps core failures to HTTP errors. Transient kinds stay distinguishable
/// so clients know they may retry.
///
fn into_http(e: RelayError) -> error::Error {
    match e {
        RelayError::InvalidInput(m) => error::ErrorBadRequest(m),
        RelayError::ConcurrentConflict(m) => error::ErrorConflict(m),
        RelayError::StorageUnavailable(m) => {
            error!(reason = %m, "command storage unavailable");
            error::ErrorServiceUnavailable("Database not responding.")
        }
    }
}

async fn commands_output(state: &ServerActor<Repository>) -> Result<CommandsOutput> {
    let commands = state.repo.list().await.map_err(into_http)?;
    Ok(CommandsOutput {
        success: true,
        count: commands.len(),
        commands,
    })
}

#[inline(always)]
#[get("/")]
async fn root() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body("IoT relay server is running")
}

#[inline(always)]
#[get("/version")]
async fn version(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    let v = Version {
        version: state.version.to_string(),
    };
    Ok(Json(v))
}

#[post("/commands")]
async fn submit_command(
    input: Json<CommandInput>,
    state: Data<ServerActor<Repository>>,
) -> Result<impl Responder> {
    let submission = state.repo.submit(&input.command).await.map_err(into_http)?;
    debug!(status = %submission.status, id = submission.record.id, "command submitted");
    Ok(Json(submission))
}

#[get("/commands")]
async fn list_commands(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    Ok(Json(commands_output(&state).await?))
}

#[get("/all_commands")]
async fn all_commands(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    Ok(Json(commands_output(&state).await?))
}

#[delete("/commands/{id}")]
async fn delete_command(
    path: web::Path<i64>,
    state: Data<ServerActor<Repository>>,
) -> Result<impl Responder> {
    let id = path.into_inner();
    if !state.repo.delete_by_id(id).await.map_err(into_http)? {
        return Err(error::ErrorNotFound("Command not found."));
    }
    Ok(Json(json!({ "success": true, "id": id })))
}

/// Plain text for devices polling the latest command.
///
#[get("/last_command")]
async fn last_command(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    let response = match state.repo.latest().await.map_err(into_http)? {
        Some(record) => HttpResponse::Ok()
            .content_type("text/plain")
            .body(record.command),
        None => HttpResponse::NotFound()
            .content_type("text/plain")
            .body("No command found."),
    };
    Ok(response)
}

#[get("/last_command_json")]
async fn last_command_json(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    let response = match state.repo.latest().await.map_err(into_http)? {
        Some(record) => HttpResponse::Ok().json(json!({
            "success": true,
            "last_command": LastCommand {
                value: record.command,
                timestamp: record.created_at,
            },
        })),
        None => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "No command found.",
        })),
    };
    Ok(response)
}

#[post("/esp_message")]
async fn push_message(
    input: Json<MessageInput>,
    state: Data<ServerActor<Repository>>,
) -> Result<impl Responder> {
    let entry = state
        .buffer
        .push(input.device_id.as_deref(), &input.message)
        .map_err(into_http)?;
    Ok(Json(json!({ "success": true, "message": entry })))
}

#[get("/messages")]
async fn list_messages(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    let messages = state.buffer.list();
    Ok(Json(MessagesOutput {
        success: true,
        count: messages.len(),
        messages,
    }))
}

#[get("/status")]
async fn status(state: Data<ServerActor<Repository>>) -> Result<impl Responder> {
    let commands_stored = state.repo.count().await.map_err(into_http)?;
    Ok(Json(StatusOutput {
        service: state.version.to_string(),
        status: "online",
        commands_stored,
        messages_in_memory: state.buffer.len(),
        routes_available: &ROUTES,
        timestamp: Utc::now(),
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    let setup = match args.len() {
        0 | 1 => Setup::default(),
        _ => Setup::from_file(&args[1])?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(setup.get_log_filter())),
        )
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut repo = match Repository::new(&setup, clock.clone()).await {
        Ok(repo) => repo,
        Err(e) => return Err(Error::new(ErrorKind::NotConnected, e.to_string())),
    };

    if let Err(e) = repo.migrate().await {
        return Err(Error::new(ErrorKind::NotConnected, e.to_string()));
    };

    let repo = Arc::new(repo);
    let buffer = Arc::new(MessageBuffer::new(setup.get_buffer_config(), clock));
    let sweeper = spawn_sweeper(buffer.clone(), setup.get_sweep_interval());

    let service = ServerActor {
        version: VERSION.to_string(),
        repo: repo.clone(),
        buffer,
    };

    info!(addr = %setup.get_addr(), "starting iot relay server");

    let served = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(service.clone()))
            .service(root)
            .service(version)
            .service(submit_command)
            .service(list_commands)
            .service(all_commands)
            .service(delete_command)
            .service(last_command)
            .service(last_command_json)
            .service(push_message)
            .service(list_messages)
            .service(status)
    })
    .bind((setup.get_ip(), setup.get_port()))?
    .run()
    .await;

    if let Err(e) = &served {
        error!(error = %e, "cannot run iot relay server");
    }

    info!("stopping iot relay server");
    sweeper.stop().await;
    repo.close().await;
    info!("all connections closed");

    served
}
