//! services/client/src/bin/docunexus.rs

use clap::{Parser, Subcommand};
use client_lib::{
    adapters::HttpAdapter,
    config::Config,
    error::ClientError,
    web::{auth, Route, SessionStore, StatusPoller},
    DocumentRepository,
};
use docunexus_core::domain::{Credentials, Document, NewAccount, UploadFile};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line client for the DocuNexus document analysis service.
///
/// Connection settings and credentials are read from the environment
/// (`DOCUNEXUS_API_URL`, `DOCUNEXUS_EMAIL`, `DOCUNEXUS_PASSWORD`) or a `.env`
/// file in the working directory.
#[derive(Parser)]
#[command(name = "docunexus", version, about = "DocuNexus document client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the configured email and password under a new username.
    SignUp { username: String },

    /// Show the signed-in account.
    Whoami,

    /// Exchange the refresh cookie for a new access token.
    Refresh,

    /// List your documents.
    List,

    /// Show one document, including its insights once processing completes.
    Show { document_id: String },

    /// Check a document's processing status.
    Status {
        document_id: String,

        /// Keep checking until processing completes or fails.
        #[arg(long)]
        wait: bool,
    },

    /// Upload a PDF (at most 2 MB).
    Upload { path: PathBuf },

    /// Delete a document.
    Delete { document_id: String },

    /// Ask a question about a processed document.
    Ask {
        document_id: String,
        question: String,
    },

    /// Show the questions already asked about a document.
    History { document_id: String },
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- 2. Initialize the Adapter, Session and Repository ---
    let http = Arc::new(HttpAdapter::from_config(&config)?);
    let session = SessionStore::new();
    let repository = DocumentRepository::new(http.clone(), http.clone(), session.reader());

    let (Some(email), Some(password)) = (config.email.clone(), config.password.clone()) else {
        return Err(ClientError::NotSignedIn);
    };

    // Registration happens before there is anyone to sign in as.
    let command = match cli.command {
        Commands::SignUp { username } => {
            let account = NewAccount {
                email,
                username,
                password,
            };
            let profile = auth::sign_up(http.as_ref(), &account).await?;
            println!("registered {} <{}>", profile.username, profile.email);
            return Ok(());
        }
        command => command,
    };

    // --- 3. Sign In ---
    let user = auth::sign_in(http.as_ref(), &session, &Credentials { email, password }).await?;
    info!("Signed in as {}", user.username);

    // --- 4. Run the Command ---
    let result = run(command, &config, http.as_ref(), &session, &repository).await;

    let signed_out = auth::sign_out(http.as_ref(), &session, &repository).await;
    finish(result, signed_out)
}

/// The command's own error wins; a failed sign-out is logged and only
/// surfaces when the command succeeded.
fn finish(
    result: Result<(), ClientError>,
    signed_out: Result<Route, ClientError>,
) -> Result<(), ClientError> {
    match (result, signed_out) {
        (Err(e), Err(sign_out_error)) => {
            warn!("Sign-out failed after an earlier error: {}", sign_out_error);
            Err(e)
        }
        (Err(e), Ok(_)) => Err(e),
        (Ok(()), Err(sign_out_error)) => {
            warn!("Sign-out failed: {}", sign_out_error);
            Err(sign_out_error)
        }
        (Ok(()), Ok(_)) => Ok(()),
    }
}

async fn run(
    command: Commands,
    config: &Config,
    http: &HttpAdapter,
    session: &SessionStore,
    repository: &DocumentRepository,
) -> Result<(), ClientError> {
    match command {
        Commands::SignUp { .. } => {
            return Err(ClientError::Internal("sign-up runs before sign-in".to_string()));
        }
        Commands::Whoami => {
            let profile = auth::current_user(http, session).await?;
            println!("{}  {} <{}>", profile.id, profile.username, profile.email);
            println!("since:    {}", profile.created_at.to_rfc3339());
        }
        Commands::Refresh => {
            let user = auth::refresh(http, session).await?;
            match user.expires_in {
                Some(seconds) => println!("access token renewed for {}s", seconds),
                None => println!("access token renewed"),
            }
        }
        Commands::List => {
            let list = repository.list_documents().await?;
            println!("{} document(s)", list.total);
            for document in &list.documents {
                println!(
                    "{}  {:<10}  {:>9} B  {}",
                    document.id, document.processing_status, document.file_size, document.filename
                );
            }
        }
        Commands::Show { document_id } => {
            let document = repository.get_document(&document_id).await?;
            print_document(&document)?;
        }
        Commands::Status { document_id, wait } => {
            let poller = StatusPoller::new(
                repository.document_service(),
                repository.session().clone(),
                &document_id,
            );
            if wait {
                match poller
                    .poll_until_terminal(config.poll_interval, config.poll_max_attempts)
                    .await?
                {
                    Some(status) if status.processing_status.is_terminal() => {
                        println!("{}", status.processing_status);
                        if let Some(message) = status.error_message {
                            println!("error: {}", message);
                        }
                        let document = repository.refetch_document(&document_id).await?;
                        print_document(&document)?;
                    }
                    Some(status) => println!("{} (still running)", status.processing_status),
                    None => println!("no status received"),
                }
            } else {
                poller.check().await?;
                if let Some(status) = poller.latest() {
                    println!("{}", status.processing_status);
                    if let Some(message) = status.error_message {
                        println!("error: {}", message);
                    }
                }
            }
        }
        Commands::Upload { path } => {
            let bytes = tokio::fs::read(&path).await?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ClientError::Internal(format!("'{}' is not a file", path.display()))
                })?;
            let mime_type = mime_guess::from_path(&path).first_or_octet_stream();
            let receipt = repository
                .upload_document(UploadFile::new(filename, mime_type.essence_str(), bytes))
                .await?;
            println!("{}  {}", receipt.document_id, receipt.processing_status);
        }
        Commands::Delete { document_id } => {
            let receipt = repository.delete_document(&document_id).await?;
            println!("{}", receipt.message);
        }
        Commands::Ask {
            document_id,
            question,
        } => {
            let query = repository.submit_query(&document_id, &question).await?;
            println!("{}", query.response_text);
            if let Some(confidence) = query.confidence_score {
                println!("(confidence {:.2})", confidence);
            }
        }
        Commands::History { document_id } => {
            for query in repository.list_queries(&document_id).await? {
                println!("Q: {}\nA: {}\n", query.query_text, query.response_text);
            }
        }
    }
    Ok(())
}

fn print_document(document: &Document) -> Result<(), ClientError> {
    println!("{}  {}", document.id, document.filename);
    println!("status:   {}", document.processing_status);
    println!("size:     {} B", document.file_size);
    println!("uploaded: {}", document.created_at.to_rfc3339());
    if let Some(message) = &document.error_message {
        println!("error:    {}", message);
    }
    if let Some(insights) = &document.insights {
        let pretty = serde_json::to_string_pretty(insights)
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        println!("insights:\n{}", pretty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docunexus_core::ports::PortError;

    fn rejected(status: u16) -> ClientError {
        ClientError::Port(PortError::Rejected {
            status,
            message: "failed".to_string(),
        })
    }

    #[test]
    fn command_error_outranks_sign_out_error() {
        let err = finish(Err(ClientError::NotSignedIn), Err(rejected(503))).unwrap_err();
        assert!(matches!(err, ClientError::NotSignedIn));

        let err = finish(Err(ClientError::NotSignedIn), Ok(Route::Landing)).unwrap_err();
        assert!(matches!(err, ClientError::NotSignedIn));
    }

    #[test]
    fn sign_out_error_surfaces_after_a_successful_command() {
        let err = finish(Ok(()), Err(rejected(503))).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Port(PortError::Rejected { status: 503, .. })
        ));
        assert!(finish(Ok(()), Ok(Route::Landing)).is_ok());
    }
}
