use clap::Parser;
use fngen::core::generate;
use fngen::utils::error::GenError;
use fngen::utils::{logger, validation::Validate};
use fngen::{CliConfig, GeneratorConfig, Generator, LocalStorage, Project};
use tokio_util::sync::CancellationToken;

fn fail(e: &GenError) -> ! {
    tracing::error!("❌ {} (Category: {:?})", e, e.category());
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

fn load_config(cli: &CliConfig) -> Result<GeneratorConfig, GenError> {
    cli.validate()?;
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::load_or_default(cli.config_file())?,
    };
    if let Some(concurrency) = cli.concurrency {
        config.generator.concurrency = concurrency;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting fngen");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let project = Project::new(&cli.project_dir).with_work(cli.work.clone());
    let storage = LocalStorage::new(&cli.project_dir);
    let abort_timeout = config.abort_timeout();

    let loaded = tokio::task::spawn_blocking(move || Generator::load(project, config, storage)).await;
    let generator = match loaded {
        Ok(Ok(generator)) => generator,
        Ok(Err(e)) => fail(&e),
        Err(e) => fail(&GenError::UnitInterrupted {
            unit: "load".to_string(),
            message: e.to_string(),
        }),
    };

    let cancel = CancellationToken::new();
    let running = generator.start(&cancel, cli.monitor);
    let control = running.control();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting within {:?}", abort_timeout);
            if let Err(e) = control.abort(abort_timeout).await {
                tracing::error!("❌ {}", e);
                std::process::exit(e.exit_code());
            }
        }
    });

    let summary = generate::collect(running, |result| {
        let prefix = format!("[{}/{}] {}", result.step_no, result.step_total, result.step);
        match &result.outcome {
            Ok(value) => println!("✅ {} {} {}", prefix, result.unit, value),
            Err(err) if err.is_aborted() => println!("⏹️ {} {} aborted", prefix, result.unit),
            Err(err) => {
                println!("❌ {} {} failed", prefix, result.unit);
                eprintln!("   {}", err.user_friendly_message());
            }
        }
    })
    .await;

    if let Some(path) = &cli.dump {
        let written = generator
            .dump()
            .and_then(|json| std::fs::write(path, json).map_err(|e| GenError::file(path, e)));
        match written {
            Ok(()) => tracing::info!("📁 Model written to {}", path.display()),
            Err(e) => fail(&e),
        }
    }

    tracing::info!(
        "📊 {} succeeded, {} failed, {} aborted in {:?}",
        summary.succeeded,
        summary.failed,
        summary.aborted,
        summary.elapsed
    );
    println!(
        "{} succeeded, {} failed, {} aborted ({:.2?})",
        summary.succeeded, summary.failed, summary.aborted, summary.elapsed
    );

    if summary.aborted > 0 {
        fail(&GenError::Aborted);
    }
    if summary.failed > 0 {
        std::process::exit(1);
    }
}
