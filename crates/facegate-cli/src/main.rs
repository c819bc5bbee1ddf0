use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face registration and search CLI")]
struct Cli {
    /// Gateway base URL
    #[arg(long, env = "FACEGATE_URL", default_value = "http://127.0.0.1:8000", global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the face(s) in an image under a name
    Register {
        /// Name stored with the face (e.g., "alice")
        #[arg(short, long)]
        name: String,
        /// Image file to upload
        image: PathBuf,
    },
    /// Search for registered faces matching an image
    Search {
        /// Image file to upload
        image: PathBuf,
    },
    /// Check that the gateway is running
    Status,
}

/// Thin client for the gateway's HTTP API.
struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn register(&self, name: &str, image: &Path) -> Result<Value> {
        let form = Form::new().text("img_name", name.to_string()).part("file", image_part(image).await?);
        self.post_form("/register", form).await
    }

    async fn search(&self, image: &Path) -> Result<Value> {
        let form = Form::new().part("file", image_part(image).await?);
        self.post_form("/search", form).await
    }

    async fn status(&self) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .with_context(|| format!("gateway unreachable at {}", self.base_url))?;
        read_json(resp).await
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "uploading");
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("gateway unreachable at {}", self.base_url))?;
        read_json(resp).await
    }
}

async fn image_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}

/// Parse a JSON body; non-2xx responses become errors carrying `detail`.
async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let detail = body
            .get("detail")
            .map(|d| d.as_str().map(str::to_owned).unwrap_or_else(|| d.to_string()))
            .unwrap_or_else(|| "no detail".to_string());
        bail!("gateway returned {}: {detail}", status.as_u16());
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = GatewayClient::new(&cli.url);

    let response = match cli.command {
        Commands::Register { name, image } => client.register(&name, &image).await?,
        Commands::Search { image } => {
            let response = client.search(&image).await?;
            if response["matches"].as_array().is_some_and(|m| m.is_empty()) {
                println!("No matching faces");
                return Ok(());
            }
            response
        }
        Commands::Status => client.status().await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mockito::Matcher;

    fn temp_image(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("facegate-cli-{}-{name}", std::process::id()));
        std::fs::write(&path, b"fake image bytes").unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register() {
        let cli = Cli::try_parse_from(["facegate", "register", "--name", "alice", "face.jpg"]).unwrap();
        match cli.command {
            Commands::Register { name, image } => {
                assert_eq!(name, "alice");
                assert_eq!(image, PathBuf::from("face.jpg"));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_parse_register_requires_name() {
        assert!(Cli::try_parse_from(["facegate", "register", "face.jpg"]).is_err());
    }

    #[test]
    fn test_parse_global_url() {
        let cli = Cli::try_parse_from(["facegate", "search", "q.png", "--url", "http://gw:9000"]).unwrap();
        assert_eq!(cli.url, "http://gw:9000");
        assert!(matches!(cli.command, Commands::Search { .. }));
    }

    #[tokio::test]
    async fn test_register_uploads_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/register")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="img_name""#.into()),
                Matcher::Regex("alice".into()),
                Matcher::Regex(r#"name="file"; filename="facegate-cli-"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"success","result":{"inserted":1}}"#)
            .create_async()
            .await;

        let image = temp_image("register.png");
        let body = GatewayClient::new(&server.url()).register("alice", &image).await.unwrap();
        assert_eq!(body["status"], "success");
        mock.assert_async().await;
        let _ = std::fs::remove_file(image);
    }

    #[tokio::test]
    async fn test_error_detail_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(400)
            .with_body(r#"{"detail":"Invalid image"}"#)
            .create_async()
            .await;

        let image = temp_image("search.png");
        let err = GatewayClient::new(&server.url()).search(&image).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway returned 400: Invalid image");
        let _ = std::fs::remove_file(image);
    }

    #[tokio::test]
    async fn test_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"message":"DeepFace API is running"}"#)
            .create_async()
            .await;

        let body = GatewayClient::new(&format!("{}/", server.url())).status().await.unwrap();
        assert_eq!(body["message"], "DeepFace API is running");
    }

    #[tokio::test]
    async fn test_missing_image_file() {
        let err = GatewayClient::new("http://127.0.0.1:1")
            .search(Path::new("/nonexistent/face.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("reading /nonexistent/face.png"));
    }
}
