use anyhow::{Context, Result};
use clap::Parser;
use locallink_core::generic_types::GeoPoint;
use locallink_core::request::CustomerContext;
use locallink_core::session::{
    IntakeDeps, IntakeSession, SendOutcome, SessionPhase, SessionSettings, VoiceStart,
};
use locallink_core::turn_log::InlineImage;
use locallink_intake::attachment::load_image;
use locallink_intake::audio;
use locallink_intake::config::Config;
use locallink_intake::gemini_adapter::{GeminiLiveConnector, GeminiTextModel};
use locallink_intake::prompt_loader::PromptSet;
use locallink_intake::repl::{Command, accepts_text};
use locallink_intake::sink::{ConsoleListener, JsonlRequestSink, SessionEnd, render_turn};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

const HELP: &str = "Type what you need. Commands: /image <path>, /voice, /stop, /quit";

#[derive(Parser)]
#[command(version, about = "Tell LocalLink Sahayak what you need from the local market")]
struct Cli {
    /// Customer name used in the greeting and the request
    #[arg(long, default_value = "Guest")]
    name: String,
    #[arg(long, default_value = "guest")]
    customer_id: String,
    #[arg(long, default_value = "")]
    pin_code: String,
    #[arg(long, default_value = "")]
    city: String,
    #[arg(long)]
    locality: Option<String>,
    /// Enables map grounding together with --longitude
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,
    #[arg(long)]
    input_device: Option<String>,
    #[arg(long)]
    output_device: Option<String>,
    /// Print the audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    fn customer(&self) -> CustomerContext {
        CustomerContext {
            id: self.customer_id.clone(),
            name: self.name.clone(),
            pin_code: self.pin_code.clone(),
            city: self.city.clone(),
            locality: self.locality.clone(),
            location: self
                .latitude
                .zip(self.longitude)
                .map(|(latitude, longitude)| GeoPoint {
                    latitude,
                    longitude,
                }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr; stdout is the conversation.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if args.list_devices {
        println!("{}", audio::describe_devices()?);
        return Ok(());
    }

    tracing::info!("Configuration loaded. Starting intake service...");
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; the assistant will not be able to answer.");
    }

    // --- 4. Load Prompts ---
    let prompts = PromptSet::load_or_default(&config.prompts_dir);

    // --- 5. Wire the Session ---
    let deps = IntakeDeps::new(
        Arc::new(GeminiTextModel::new(config.gemini())),
        Arc::new(GeminiLiveConnector::new(config.gemini())),
        audio::default_backend(args.input_device.clone(), args.output_device.clone()),
    )
    .with_messages(prompts.messages);
    let settings = SessionSettings {
        system_instruction: prompts.system_instruction,
        voice_name: config.voice_name.clone(),
        finalize_delay: config.finalize_delay,
        uplink_block_size: config.uplink_block_size,
    };
    let (listener, mut end) = ConsoleListener::new(JsonlRequestSink::new(&config.requests_out));
    let session = IntakeSession::new(deps, settings, args.customer(), Arc::new(listener));

    println!("{}", render_turn(&session.greeting()));
    println!("({HELP})");

    // --- 6. Conversation Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attachment: Option<InlineImage> = None;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = end.changed() => break,
        };
        let Some(line) = line else { break };
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Stop => session.stop_voice(),
            Command::Voice => {
                let voice = session.clone();
                tokio::spawn(async move {
                    match voice.start_voice().await {
                        Ok(VoiceStart::Active) => println!("(listening, /stop to end voice)"),
                        Ok(VoiceStart::AlreadyRunning) => println!("(voice is already on)"),
                        Ok(VoiceStart::Cancelled) => {}
                        Err(e) => tracing::debug!("Voice did not start: {}", e),
                    }
                });
            }
            Command::Image("") => println!("(usage: /image <path>)"),
            Command::Image(path) => match load_image(Path::new(path)) {
                Ok(image) => {
                    attachment = Some(image);
                    println!("(photo attached, it goes with your next message)");
                }
                Err(e) => println!("(could not attach photo: {e:#})"),
            },
            Command::Unknown => println!("(unknown command, {HELP})"),
            // Any attached photo waits for the next typed message.
            Command::Say(text) if !text.is_empty() && !accepts_text(session.phase()) => {
                println!("(voice is on, /stop to type)")
            }
            Command::Say(text) => match session.send_text(text, attachment.take()).await {
                SendOutcome::Ignored | SendOutcome::Replied | SendOutcome::Discarded => {}
                SendOutcome::Finalized => break,
                SendOutcome::Failed(e) => tracing::warn!("Message failed: {}", e),
            },
        }

        if *end.borrow() != SessionEnd::Running {
            break;
        }
    }

    // Let a voice finalization that is already underway finish its handoff.
    if session.phase() == SessionPhase::Finalizing {
        let _ = end.wait_for(|state| *state != SessionEnd::Running).await;
    }
    session.close();
    tracing::info!("Intake session ended.");
    Ok(())
}
