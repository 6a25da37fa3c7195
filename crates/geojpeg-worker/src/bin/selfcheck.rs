use std::path::Path;

use geojpeg_models::InputFormat;
use geojpeg_raster::{has_driver, tool_version, GdalRunner, GdalTool};
use geojpeg_worker::ConversionConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ConversionConfig::from_env()?;

    println!(
        "geojpeg-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let runner = config.gdal_runner().with_timeout(30);
    ensure_gdal(&runner).await?;
    ensure_mrsid(&runner, &config).await?;

    println!("geojpeg-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

async fn ensure_gdal(runner: &GdalRunner) -> anyhow::Result<()> {
    for tool in GdalTool::ALL {
        let path = runner
            .locate(tool)
            .map_err(|e| anyhow::anyhow!("{} not available: {}", tool.program(), e))?;
        let version = tool_version(runner, tool)
            .await
            .map_err(|e| anyhow::anyhow!("{} --version failed: {}", tool.program(), e))?;
        println!("geojpeg-selfcheck: {} ({}) {}", tool.program(), path.display(), version);
    }
    Ok(())
}

async fn ensure_mrsid(runner: &GdalRunner, config: &ConversionConfig) -> anyhow::Result<()> {
    let available = has_driver(runner, "MrSID").await?;
    println!(
        "geojpeg-selfcheck: MrSID driver {}",
        if available { "available" } else { "missing" }
    );

    let wants_sid = config.batches.iter().any(|b| b.format == InputFormat::Sid);
    if wants_sid && !available {
        return Err(anyhow::anyhow!(
            "a MrSID batch is configured but GDAL has no MrSID driver"
        ));
    }
    Ok(())
}
