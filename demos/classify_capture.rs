//! Example: I2C transaction classification
//!
//! Replays a canned I2C capture through the transaction classifier and prints
//! the resulting annotations.
//!
//! Usage:
//!   cargo run --release --example classify_capture -- --mode update
//!
//! Limit output:
//!   cargo run --release --example classify_capture -- --mode diagnosis -n 10

use clap::{Parser, ValueEnum};
use i2c_hla::nodes::decoders::{AnalyzerMode, Annotation, ClassifierSettings, TransactionClassifier};
use i2c_hla::runtime::{InputPort, OutputPort, Pipeline, ProcessNode, WorkError, WorkResult};
use i2c_hla::{FrameReplaySource, I2cFrame};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Diagnosis,
    Update,
    Plain,
}

impl From<Mode> for AnalyzerMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Diagnosis => AnalyzerMode::Diagnosis,
            Mode::Update => AnalyzerMode::Update,
            Mode::Plain => AnalyzerMode::Plain,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Analyzer mode
    #[arg(long, value_enum, default_value = "diagnosis")]
    mode: Mode,

    /// Number of annotations to print (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    n: usize,
}

/// Sink that prints annotations
struct AnnotationPrinter {
    count: usize,
    max_annotations: usize,
}

impl AnnotationPrinter {
    fn new(max_annotations: usize) -> Self {
        Self {
            count: 0,
            max_annotations,
        }
    }
}

impl ProcessNode for AnnotationPrinter {
    fn name(&self) -> &str {
        "annotation_printer"
    }

    fn should_stop(&self) -> bool {
        self.max_annotations > 0 && self.count >= self.max_annotations
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0 // Sink
    }

    fn input_schema(&self) -> Vec<i2c_hla::PortSchema> {
        use i2c_hla::{PortDirection, PortSchema};
        vec![PortSchema::new::<Annotation>(
            "annotations",
            0,
            PortDirection::Input,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input_buffer = std::collections::VecDeque::new();
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<Annotation>(&mut input_buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        let annotation = input.recv()?;

        self.count += 1;
        info!("Annotation #{}: {}", self.count, annotation);

        if self.max_annotations > 0 && self.count >= self.max_annotations {
            info!(
                "[AnnotationPrinter] Max annotations ({}) reached, shutting down",
                self.max_annotations
            );
            return Err(WorkError::Shutdown);
        }

        Ok(1)
    }
}

/// Build a canned capture: one firmware-update command write, a diagnostic
/// readback of register 0x16 (passing) and one of register 0x1C (failing).
fn canned_capture() -> Vec<I2cFrame> {
    let mut frames = Vec::new();
    let mut t = 0u64;

    let mut push = |frame: I2cFrame| {
        frames.push(frame);
    };

    let step = 10u64;

    // Firmware-update command: BL Status
    push(I2cFrame::Start {
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Address {
        address: 0x12,
        is_read: false,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Data {
        value: 0x80,
        start_time: t,
        end_time: t + step,
    });
    t += step;

    // Diagnostic readback of register 0x16, status byte zero (PASS)
    push(I2cFrame::Start {
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Address {
        address: 0x12,
        is_read: false,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Data {
        value: 0x16,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Address {
        address: 0x12,
        is_read: true,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    for value in [0x41, 0x42, 0x43, 0x00] {
        push(I2cFrame::Data {
            value,
            start_time: t,
            end_time: t + step,
        });
        t += step;
    }

    // Diagnostic readback of register 0x1C, status byte nonzero (FAIL)
    push(I2cFrame::Start {
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Address {
        address: 0x12,
        is_read: false,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Data {
        value: 0x1C,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    push(I2cFrame::Address {
        address: 0x12,
        is_read: true,
        start_time: t,
        end_time: t + step,
    });
    t += step;
    for value in [0x51, 0x52, 0x07] {
        push(I2cFrame::Data {
            value,
            start_time: t,
            end_time: t + step,
        });
        t += step;
    }

    frames
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== I2C Classification Example ===");
    info!("Mode: {:?}", args.mode);

    let frames = canned_capture();
    info!("Capture: {} frames", frames.len());

    let mut pipeline = Pipeline::new();

    pipeline.add_process("source", FrameReplaySource::new(frames))?;
    pipeline.add_process(
        "classifier",
        TransactionClassifier::new(ClassifierSettings::new(args.mode.into())),
    )?;
    pipeline.add_process("printer", AnnotationPrinter::new(args.n))?;

    pipeline.connect("source", "frames", "classifier", "frames")?;
    pipeline.connect("classifier", "annotations", "printer", "annotations")?;

    // Build and run
    info!("Building pipeline...");
    let scheduler = pipeline.build()?;

    info!("Running...");
    scheduler.wait();

    info!("Done!");

    Ok(())
}
