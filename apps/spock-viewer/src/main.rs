//! Spock Engine Viewer
//!
//! Opens a window and renders a compute background with a triangle and a
//! rectangle mesh on top.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p spock-viewer -- [OPTIONS]
//! ```
//!
//! ## Controls
//!
//! - `Space` / `Tab`: cycle the background effect
//! - `Escape`: quit
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use spock_engine::{logging, Engine, EngineConfig};
use tracing::error;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    logging::init()?;
    run().inspect_err(|e| error!("{e:#}"))
}

fn run() -> anyhow::Result<()> {
    let config = EngineConfig::from_args()?;
    let mut engine = Engine::init(&config)?;
    engine.run()?;
    Ok(())
}

fn print_help() {
    eprintln!(
        "Spock Engine Viewer

USAGE:
    cargo run -p spock-viewer -- [OPTIONS]

WINDOW OPTIONS:
    --width <N>             Window width (default: 800)
    --height <N>            Window height (default: 450)
    --resizable             Allow resizing the window

RENDER OPTIONS:
    --draw-width <N>        Draw image width (default: window width)
    --draw-height <N>       Draw image height (default: window height)
    --background <MODE>     'compute' (default) or 'clear'
    --effect <NAME>         Initial compute effect: 'gradient' (default) or 'sky'
    --no-geometry           Skip the triangle and mesh pass
    --shaders <DIR>         Load compiled .spv shaders from DIR (default: embedded)
    --validation            Enable Vulkan validation layers
    --no-validation         Disable Vulkan validation layers
                            (default: enabled in debug builds)

OTHER:
    -h, --help              Print this help message

CONTROLS:
    Space / Tab             Cycle background effect
    Escape                  Quit

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)"
    );
}
