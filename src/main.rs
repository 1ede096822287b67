use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicewake::assistant::{build_dispatcher, build_speaker, save_memory};
use voicewake::config::CliOverrides;
use voicewake::voice::{AudioCapture, AudioInput, AudioPlayback, DecodedAudio, Microphone, rms_energy};
use voicewake::{Assistant, Config, MemoryStore};

/// voicewake - say the wake phrase, ask a question, hear the answer
#[derive(Parser)]
#[command(name = "voicewake", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.config/voicewake/config.toml)
    #[arg(short, long, global = true, env = "VOICEWAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Wake phrase; repeat for several
    #[arg(short, long = "wake-word")]
    wake_words: Vec<String>,

    /// Working directory of the local agent
    #[arg(short = 'p', long)]
    agent_dir: Option<PathBuf>,

    /// Destination passed to the agent
    #[arg(long)]
    to: Option<String>,

    /// Voice for speech synthesis
    #[arg(long)]
    voice: Option<String>,

    /// Directory for memory and the interaction journal
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Only log replies, never speak
    #[arg(long)]
    no_tts: bool,

    /// Skip the fast remote model and always use the agent
    #[arg(long)]
    no_fast: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Listen for the wake phrase (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Dispatch one command and print the reply
    Ask {
        /// Command text
        message: String,
    },
    /// Measure ambient noise and print the speech threshold
    Calibrate,
    /// Remember a fact about the user
    Remember {
        /// Fact to remember
        fact: String,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            wake_words: self.wake_words.clone(),
            agent_dir: self.agent_dir.clone(),
            to: self.to.clone(),
            voice: self.voice.clone(),
            data_dir: self.data_dir.clone(),
            no_tts: self.no_tts,
            no_fast: self.no_fast,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicewake=info",
        1 => "info,voicewake=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = cli.overrides();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let config = Config::load(&overrides)?;
            tracing::debug!(?config, "loaded configuration");
            Assistant::new(config).run().await?;
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&overrides, &text).await,
        Command::Ask { message } => ask(&overrides, &message).await,
        Command::Calibrate => calibrate(&overrides).await,
        Command::Remember { fact } => remember(&overrides, &fact),
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback
        .play_samples(DecodedAudio {
            samples,
            sample_rate,
        })
        .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Speak text through the configured synthesizer
#[allow(clippy::future_not_send)]
async fn test_tts(overrides: &CliOverrides, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(overrides)?;
    let mut speaker = build_speaker(&config);

    if speaker.speak(text).await {
        println!("If you heard the speech, TTS is working!");
    } else {
        println!("Nothing was played; run with -v for details.");
    }

    Ok(())
}

/// Dispatch one command without the microphone
async fn ask(overrides: &CliOverrides, message: &str) -> anyhow::Result<()> {
    let config = Config::load(overrides)?;
    let memory = MemoryStore::load(config.memory_path()).shared();
    let mut dispatcher = build_dispatcher(&config)?.with_memory(memory.clone());

    let result = dispatcher.dispatch(message).await;
    save_memory(&memory);

    match result.source {
        Some(source) if result.ok => {
            println!("[{source:?}] {}", result.text);
            Ok(())
        }
        _ => anyhow::bail!("no backend produced a reply"),
    }
}

/// Print the ambient noise threshold
#[allow(clippy::future_not_send)]
async fn calibrate(overrides: &CliOverrides) -> anyhow::Result<()> {
    let config = Config::load(overrides)?;
    let mut microphone = Microphone::new(&config.listen)?;

    println!(
        "Sampling ambient noise for {:.1}s, stay quiet...",
        config.listen.calibration.as_secs_f32()
    );
    let threshold = microphone.calibrate(config.listen.calibration).await?;
    println!("Speech threshold: {threshold:.4}");
    println!(
        "(floor {:.4}, ceiling {:.4})",
        config.listen.energy_floor, config.listen.energy_ceiling
    );

    Ok(())
}

/// Add a fact to the memory store
fn remember(overrides: &CliOverrides, fact: &str) -> anyhow::Result<()> {
    let config = Config::load(overrides)?;
    let mut store = MemoryStore::load(config.memory_path());
    store.remember(fact);
    store.save()?;
    println!("Remembered: {fact}");
    Ok(())
}
