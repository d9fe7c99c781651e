//! vkgfx demo
//!
//! Draws three spinning textured cubes behind a translucent pane, using one
//! shader pair and three pipeline variants (solid, wireframe, alpha blended).
//!
//! ## Usage
//!
//! ```bash
//! glslc shaders/mesh.vert -o shaders/mesh.vert.spv
//! glslc shaders/lit.frag -o shaders/lit.frag.spv
//! cargo run -p vkgfx-demo -- [OPTIONS]
//! ```
//!
//! ## Controls
//!
//! - `W`: toggle wireframe
//! - `Space`: pause animation
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod cli;
mod demo;
mod mesh;
mod texture;

use vkgfx_app::run_app;

use crate::cli::DemoArgs;
use crate::demo::Demo;

fn main() -> anyhow::Result<()> {
    let args = match DemoArgs::from_env() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e:#}\n");
            print_help();
            std::process::exit(2);
        }
    };

    if args.help {
        print_help();
        return Ok(());
    }

    run_app::<Demo>(args.config())
}

fn print_help() {
    eprintln!(
        "vkgfx demo: textured meshes through the vkgfx renderer

USAGE:
    cargo run -p vkgfx-demo -- [OPTIONS]

OPTIONS:
    --width <N>         Window width in pixels (default: {width})
    --height <N>        Window height in pixels (default: {height})
    --no-vsync          Present without waiting for vertical blank
    --validation        Enable Vulkan validation layers
    --shaders <DIR>     Directory holding mesh.vert.spv and lit.frag.spv
                        (default: the crate's shaders/ directory)
    --texture <PATH>    PNG or JPEG albedo texture (default: checkerboard)
    -h, --help          Print this help message

CONTROLS:
    W                   Toggle wireframe
    Space               Pause animation

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)",
        width = cli::DEFAULT_WIDTH,
        height = cli::DEFAULT_HEIGHT,
    );
}
