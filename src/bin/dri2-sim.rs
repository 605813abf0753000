use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use fbturbo_dri2::{
    Attachment, BackendDevice, BackendKind, BoBackend, Display, Dri2Options, ImageRequest, PlaneOp,
    PublishOutcome, ROOT_WINDOW, RecordingPlane, Rect, Region, Screen, SoftScreen, UmpBackend,
    create_backend,
};

#[derive(Parser, Debug)]
#[command(name = "dri2-sim", version)]
struct Cli {
    /// Log buffer management decisions to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a client window through a number of frames and print statistics as JSON.
    Run(RunArgs),
    /// Print the effective driver options as JSON.
    Options(OptionsArgs),
}

#[derive(Parser, Debug)]
struct OptionSource {
    /// Driver options as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// xorg.conf style option, e.g. `--option SwapbuffersWait=false`. Ignored with `--config`.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

#[derive(Parser, Debug)]
struct OptionsArgs {
    #[command(flatten)]
    source: OptionSource,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: OptionSource,

    /// Frames to publish.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Screen width.
    #[arg(long, default_value_t = 640)]
    xres: u32,

    /// Screen height.
    #[arg(long, default_value_t = 480)]
    yres: u32,

    /// Client window geometry as `X,Y,WIDTH,HEIGHT`.
    #[arg(long, default_value = "40,30,256,192", value_parser = parse_rect)]
    window: Rect,

    /// Map a window over the client at this frame.
    #[arg(long)]
    overlap_at: Option<u32>,

    /// Keep the software cursor (disables the overlay).
    #[arg(long)]
    sw_cursor: bool,

    /// Buffer backend.
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Write the final screen as PNG.
    #[arg(long)]
    screenshot: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Dumb,
    Ump,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected X,Y,WIDTH,HEIGHT, got '{s}'"));
    };
    let num = |v: &str| v.parse::<i64>().map_err(|e| format!("'{v}': {e}"));
    let (x, y, w, h) = (num(*x)?, num(*y)?, num(*w)?, num(*h)?);
    if w <= 0 || h <= 0 {
        return Err(format!("window size must be positive, got {w}x{h}"));
    }
    Ok(Rect::new(x as i32, y as i32, w as u32, h as u32))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Options(args) => cmd_options(args),
    }
}

fn load_options(source: &OptionSource) -> anyhow::Result<Dri2Options> {
    if let Some(path) = &source.config {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read options '{}'", path.display()))?;
        return Dri2Options::from_json_str(&s)
            .with_context(|| format!("parse options '{}'", path.display()));
    }
    let pairs = source
        .options
        .iter()
        .map(|kv| {
            kv.split_once('=')
                .with_context(|| format!("option '{kv}' is not KEY=VALUE"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Dri2Options::from_xorg_options(pairs)?)
}

fn cmd_options(args: OptionsArgs) -> anyhow::Result<()> {
    let opts = load_options(&args.source)?;
    println!("{}", serde_json::to_string_pretty(&opts)?);
    Ok(())
}

fn make_screen(
    args: &RunArgs,
    opts: &mut Dri2Options,
) -> anyhow::Result<(Screen<SoftScreen>, fbturbo_dri2::PlaneLog)> {
    if let Some(choice) = args.backend {
        opts.use_dumb = matches!(choice, BackendChoice::Dumb);
    }
    let gfx = args.xres as usize * args.yres as usize * 4;
    let host = SoftScreen::new(args.xres, args.yres, 32, gfx * 3).context("create screen")?;
    let mut info = host.display_info();

    let backend: Box<dyn BoBackend> = match opts.backend_kind() {
        BackendKind::Ump => {
            let mut ump = UmpBackend::open(BackendDevice::default())?;
            info.fb_secure_id = ump.wrap_external(host.framebuffer().clone());
            info.alt_fb_secure_id = ump.wrap_external(host.framebuffer().clone());
            Box::new(ump)
        }
        kind => create_backend(kind, BackendDevice::default())?,
    };

    let (plane, log) = RecordingPlane::new();
    let mut screen = Screen::new(host);
    screen
        .enable_dri2(
            opts.clone(),
            backend,
            Some(Display::new(info, Box::new(plane))),
        )
        .context("enable buffer exchange")?;
    Ok((screen, log))
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut opts = load_options(&args.source)?;
    let (mut screen, log) = make_screen(&args, &mut opts)?;
    if !args.sw_cursor {
        screen.enable_hw_cursor();
    }

    let win = screen
        .host_mut()
        .create_window(ROOT_WINDOW, args.window, 0)
        .context("create client window")?;
    screen.host_mut().map_window(win);
    screen.post_validate_tree(Some(win));

    let region = Region::from_rect(Rect::new(0, 0, args.window.width, args.window.height));
    let (mut blitted, mut overlay, mut skipped) = (0u32, 0u32, 0u32);
    for frame in 0..args.frames {
        if args.overlap_at == Some(frame) {
            let r = args.window;
            let top = screen
                .host_mut()
                .create_window(
                    ROOT_WINDOW,
                    Rect::new(r.x + (r.width / 2) as i32, r.y, r.width, r.height),
                    0,
                )
                .context("create overlapping window")?;
            screen.host_mut().map_window(top);
            screen.post_validate_tree(Some(top));
        }

        let buffer = screen.create_buffer(win, Attachment::BackLeft, 0)?;
        if let Some(view) = screen.map_buffer(&buffer) {
            view.fill_u32(frame_color(frame));
        }
        match screen.copy_region(win, &region, &buffer, &buffer)? {
            PublishOutcome::Blitted { .. } => blitted += 1,
            PublishOutcome::Overlay { .. } => overlay += 1,
            PublishOutcome::Skipped => skipped += 1,
        }
        screen.destroy_buffer(buffer)?;
    }

    // Pull whatever the overlay still shows into the window.
    let _ = screen.get_image(ImageRequest {
        drawable: win,
        rect: Rect::new(0, 0, 1, 1),
    });

    if let Some(path) = &args.screenshot {
        write_png(screen.host(), args.xres, args.yres, path)?;
        eprintln!("wrote {}", path.display());
    }

    let dri2 = screen.dri2().context("buffer exchange vanished")?;
    let report = serde_json::json!({
        "options": &opts,
        "frames": { "blitted": blitted, "overlay": overlay, "skipped": skipped },
        "dri2": dri2.stats(),
        "bos": dri2.bos().stats(),
        "plane": {
            "shows": log.count(|op| *op == PlaneOp::Show),
            "hides": log.count(|op| *op == PlaneOp::Hide),
            "vsyncs": log.count(|op| *op == PlaneOp::Vsync),
        },
        "host_blits": screen.host().blit_count(),
    });

    let backend = screen
        .disable_dri2()?
        .context("buffer exchange was not enabled")?;
    let stats = backend.stats();
    if stats.live != 0 {
        tracing::warn!(live = stats.live, "allocations left after shutdown");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn frame_color(frame: u32) -> u32 {
    let v = (frame.wrapping_mul(37) & 0xff) as u8;
    u32::from_le_bytes([v, 255 - v, 0x80, 0xff])
}

fn write_png(host: &SoftScreen, width: u32, height: u32, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    // XRGB8888 little-endian to RGBA.
    let rgba: Vec<u8> = host
        .screen_bytes()
        .chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], 0xff])
        .collect();
    image::save_buffer_with_format(
        path,
        &rgba,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
