//! Model Info
//!
//! Loads a model into a headless viewer session, runs a few frames and
//! prints what was displayed.
//!
//! ```text
//! model_info <locator> [--type <ext>] [--config <file.json>] [--frames <n>]
//! ```

use std::sync::Arc;

use anyhow::{Context, bail};
use curio::{
    CurioConfig, FormatDispatcher, HeadlessSurface, LoadRequest, SurfaceSize, ViewerSession,
};

const FRAME_DT: f32 = 1.0 / 60.0;

struct Args {
    locator: String,
    explicit_type: Option<String>,
    config: Option<String>,
    frames: u32,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut locator = None;
    let mut explicit_type = None;
    let mut config = None;
    let mut frames = 60;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--type" => explicit_type = Some(args.next().context("--type needs a value")?),
            "--config" => config = Some(args.next().context("--config needs a value")?),
            "--frames" => {
                frames = args
                    .next()
                    .context("--frames needs a value")?
                    .parse()
                    .context("--frames must be a number")?;
            }
            flag if flag.starts_with("--") => bail!("unknown flag `{flag}`"),
            _ if locator.is_none() => locator = Some(arg),
            _ => bail!("unexpected argument `{arg}`"),
        }
    }

    Ok(Args {
        locator: locator.context(
            "usage: model_info <locator> [--type <ext>] [--config <file.json>] [--frames <n>]",
        )?,
        explicit_type,
        config,
        frames,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => CurioConfig::from_path(path)?,
        None => CurioConfig::default(),
    };

    let dispatcher = Arc::new(FormatDispatcher::new(config.loader));
    let (surface, handle) = HeadlessSurface::new(SurfaceSize::new(1280, 720));
    let mut session = ViewerSession::open(surface, config.viewer, dispatcher)?;

    let mut request = LoadRequest::parse(&args.locator)?.on_progress(|p| {
        log::debug!("Loading: {:.0}%", p * 100.0);
    });
    if let Some(tag) = args.explicit_type {
        request = request.with_type(tag);
    }

    let summary = session
        .load_asset(request)
        .await
        .with_context(|| format!("failed to load `{}`", args.locator))?;

    for _ in 0..args.frames {
        session.advance(FRAME_DT)?;
    }

    println!("format:        {}", summary.format);
    println!("nodes:         {}", summary.node_count);
    println!("meshes:        {}", summary.mesh_count);
    println!(
        "size:          {:.3} x {:.3} x {:.3}",
        summary.size.x, summary.size.y, summary.size.z
    );
    println!(
        "original size: {:.3} x {:.3} x {:.3}",
        summary.original_size.x, summary.original_size.y, summary.original_size.z
    );
    if summary.has_animation {
        println!("animations:    {}", summary.animations.join(", "));
        if let Some(active) = &summary.active_animation {
            println!("playing:       {active}");
        }
    }
    let eye = session.camera_transform().position;
    println!("camera:        ({:.3}, {:.3}, {:.3})", eye.x, eye.y, eye.z);
    println!("frames:        {}", handle.frames_presented());

    session.close();
    Ok(())
}
