use std::path::Path;

use bclip_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );

    let checks: Vec<(&str, anyhow::Result<()>)> = vec![
        ("work_dir", ensure_workdir(&config.work_dir).await),
        ("ffmpeg", ensure_ffmpeg(config.ffmpeg_path.as_deref()).await),
        ("intro", ensure_asset(&config.intro_path)),
        ("outro", ensure_asset(&config.outro_path)),
        ("env", ensure_env_present(&["REDIS_URL", "DB_DSN"])),
    ];

    let mut failed = 0;
    for (name, result) in &checks {
        match result {
            Ok(()) => println!("worker-selfcheck: {:<8} ok", name),
            Err(e) => {
                failed += 1;
                println!("worker-selfcheck: {:<8} FAILED: {:#}", name, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} checks failed", failed, checks.len());
    }
    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    probe.close()?;
    Ok(())
}

async fn ensure_ffmpeg(configured: Option<&Path>) -> anyhow::Result<()> {
    let program = match configured {
        Some(path) => path.to_path_buf(),
        None => bclip_media::check_ffmpeg()?,
    };

    let output = tokio::process::Command::new(&program)
        .arg("-version")
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("ffmpeg not available at {}: {}", program.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -version failed: {:?}",
            output.status
        ));
    }
    Ok(())
}

fn ensure_asset(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        return Err(anyhow::anyhow!("missing asset {}", path.display()));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
