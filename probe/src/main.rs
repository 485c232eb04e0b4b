use anyhow::{bail, Context};
use g80_modeset::edid::Edid;
use g80_modeset::{PllParams, PortMap};

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

const USAGE: &str = "usage: g80probe [-v] <command>

commands:
  pll <khz>         solve the head PLL for a pixel clock
  table <rom.bin>   decode the DDC routing table of a video BIOS image
  edid <edid.bin>   decode an EDID base block";

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().filter(|a| *a == "-v").count();
    args.retain(|a| a != "-v");

    log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("{}", e))?;
    log::set_max_level(match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    });

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["pll", khz] => pll(khz),
        ["table", path] => table(path),
        ["edid", path] => edid(path),
        _ => bail!("{}", USAGE),
    }
}

fn pll(khz: &str) -> anyhow::Result<()> {
    let pclk: u32 = khz.parse().with_context(|| format!("bad pixel clock {:?}", khz))?;
    let params = PllParams::solve(pclk);
    if params.is_zero() {
        bail!("no PLL coefficients for {} kHz", pclk);
    }
    let actual = params.frequency_khz();
    println!(
        "{} kHz: NA={} MA={} NB={} MB={} P={} -> {} kHz ({:+} kHz)",
        pclk,
        params.na,
        params.ma,
        params.nb,
        params.mb,
        params.p,
        actual,
        actual as i64 - pclk as i64
    );
    Ok(())
}

fn table(path: &str) -> anyhow::Result<()> {
    let rom = std::fs::read(path).with_context(|| format!("reading {}", path))?;
    let map = PortMap::parse(&rom).map_err(|e| anyhow::anyhow!("{}: {}", path, e))?;
    if map.is_empty() {
        println!("no ports routed");
    }
    for (port, route) in map.iter() {
        if let Some(dac) = route.dac {
            println!("bus {} -> DAC{}", port, dac);
        }
        if let Some((sor, panel)) = route.sor {
            println!("bus {} -> SOR{} ({:?})", port, sor, panel);
        }
    }
    Ok(())
}

fn edid(path: &str) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path))?;
    let edid = Edid::parse(&data).map_err(|e| anyhow::anyhow!("{}: {}", path, e))?;
    let m = &edid.manufacturer;
    println!(
        "{}{}{} {:04x} {} ({} input, {}x{} cm)",
        m[0],
        m[1],
        m[2],
        edid.product_code,
        edid.name.as_deref().unwrap_or("<unnamed>"),
        if edid.digital { "digital" } else { "analog" },
        edid.width_cm,
        edid.height_cm
    );
    for mode in &edid.modes {
        println!(
            "  {:<10} {:>7} kHz  h {} {} {} {}  v {} {} {} {}  {:?}",
            mode.name,
            mode.clock,
            mode.hdisplay,
            mode.hsync_start,
            mode.hsync_end,
            mode.htotal,
            mode.vdisplay,
            mode.vsync_start,
            mode.vsync_end,
            mode.vtotal,
            mode.flags
        );
    }
    Ok(())
}
