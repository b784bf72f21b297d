//! Zentinel streaming SOAP tool.
//!
//! Run with: `zentinel-stroap --input request.xml --header "SOAPAction: urn:ping"`
//!
//! Parses a SOAP message, logs its structure and writes it back out. A
//! message that cannot be parsed is answered with a Client (SOAP 1.1) or
//! Sender (SOAP 1.2) fault.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_stroap::parser::parse_soap_action;
use zentinel_stroap::transport::{HeaderedInput, MimeHeaders};
use zentinel_stroap::{Message, SoapElement, StroapConfig};

/// Streaming SOAP message tool for Zentinel.
///
/// Reads a SOAP message, reports its header elements and payload, and
/// writes the re-serialized message.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Input message file, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Transport header as "Name: value" (repeatable)
    #[arg(long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Output file, or "-" for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel Stroap v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        StroapConfig::from_yaml(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        StroapConfig::default()
    };

    info!(
        soap_version = %config.soap_version,
        skip_whitespace = config.reader.skip_whitespace,
        write_declaration = config.writer.write_declaration,
        "Configuration loaded"
    );

    let mut headers = MimeHeaders::new();
    for header in &args.headers {
        let (name, value) = parse_header_line(header)?;
        headers.add(name, value);
    }

    let input = read_input(&args.input).await?;
    let transport = HeaderedInput::new(headers, input.as_slice());

    let message = match Message::build_from_transport(transport, &config) {
        Ok(message) => {
            report(&message);
            message
        }
        Err(e) => {
            warn!(code = e.kind().as_str(), error = %e, "Could not parse SOAP message");
            let mut fault = Message::new(config.clone());
            fault
                .envelope_mut()
                .body_mut()
                .add_client_or_sender_fault(&e.to_string(), Some("en"));
            fault
        }
    };

    let bytes = message.to_bytes().context("Failed to serialize SOAP message")?;
    write_output(&args.output, &bytes).await?;

    info!("Done");
    Ok(())
}

/// Split a `Name: value` header argument.
fn parse_header_line(line: &str) -> Result<(&str, &str)> {
    let (name, value) = line
        .split_once(':')
        .with_context(|| format!("Invalid header '{}', expected 'Name: value'", line))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", line);
    }
    Ok((name, value.trim()))
}

async fn read_input(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read input file {}", path))
    }
}

async fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if path == "-" {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(bytes).await.context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
        Ok(())
    } else {
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write output file {}", path))
    }
}

fn report(message: &Message) {
    info!(
        message = %message,
        soap_action = %parse_soap_action(message.soap_action()),
        has_fault = message.has_fault(),
        "Parsed SOAP message"
    );
    if let Some(header) = message.envelope().header_if_present() {
        for element in header.examine_all_header_elements() {
            info!(
                name = %element.name(),
                must_understand = element.must_understand(),
                actor_or_role = element.actor_or_role().unwrap_or(""),
                "Header element"
            );
        }
    }
    if let Some(fault) = message.envelope().body().fault() {
        info!(
            code = %fault.fault_code(),
            reason = fault.fault_string_or_reason(),
            "SOAP Fault"
        );
    }
}
