use serde::Serialize;
use serde_json::json;
use stride_core::error::RemoteError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Exit codes: 0=success, 1=client error (4xx), 2=server or remote failure,
///             3=connection error, 4=usage error
pub const EXIT_OK: i32 = 0;
pub const EXIT_CLIENT: i32 = 1;
pub const EXIT_SERVER: i32 = 2;
pub const EXIT_CONNECTION: i32 = 3;
pub const EXIT_USAGE: i32 = 4;

/// Logs go to stderr so stdout stays machine-readable JSON.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stride_runtime=info,stride_cli=info".into());
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt.json()).init();
    } else {
        registry.with(fmt).init();
    }
}

fn render<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"cli_error\",\"message\":\"{e}\"}}"))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!("{}", render(value));
}

pub fn print_error(error: &str, message: &str, docs_hint: Option<&str>) {
    let mut err = json!({
        "error": error,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", render(&err));
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    print_error("cli_error", message, docs_hint);
    std::process::exit(EXIT_USAGE);
}

/// Maps a failed remote call onto the structured exit codes.
pub fn remote_exit_code(err: &RemoteError) -> i32 {
    match err {
        RemoteError::Network(_) | RemoteError::Timeout(_) => EXIT_CONNECTION,
        RemoteError::Status { status, .. } if (400..500).contains(status) => EXIT_CLIENT,
        RemoteError::Status { .. } | RemoteError::Decode(_) => EXIT_SERVER,
    }
}

pub fn report_remote(err: &RemoteError) -> i32 {
    let hint = match err {
        RemoteError::Network(_) => Some("Is the API server running? Check STRIDE_API_URL."),
        _ => None,
    };
    print_error(err.code(), &err.to_string(), hint);
    remote_exit_code(err)
}
