mod backend;
mod config;
mod errors;
mod fs;
mod mapper;
mod scratch;

use std::process;
use std::sync::Arc;

use anyhow::{Context, bail};
use fuser::MountOption;
use log::{LevelFilter, debug, error, info};

use crate::backend::ObjectBackend;
use crate::backend::swift::SwiftBackend;
use crate::config::{APP_NAME, Config};
use crate::fs::{FsWrapper, ObjectFs};
use crate::mapper::ObjectMapper;
use crate::scratch::ScratchStore;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(2);
        }
    };
    init_logging(&config);

    if let Err(err) = run(config) {
        error!("{err:#}");
        process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug { LevelFilter::Debug } else { LevelFilter::Warn };
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    if let Some(path) = &config.logfile {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => eprintln!("cannot open logfile {}: {err}", path.display()),
        }
    }
    builder.init();
}

fn run(config: Config) -> anyhow::Result<()> {
    // Fork before any runtime threads exist; everything below runs in the
    // daemon process and reports through the configured logger.
    if !config.no_daemon {
        daemonize::Daemonize::new()
            .working_directory("/")
            .start()
            .context("daemonize failed")?;
    }

    debug!("create backend");
    let backend = Arc::new(SwiftBackend::new(
        config.credentials.clone(),
        &config.container,
        config.object_list_size,
        config.debug,
    )?);
    backend.authenticate().context("authentication failed")?;

    if config.create_container {
        backend
            .container_create()
            .with_context(|| format!("cannot create container \"{}\"", config.container))?;
    } else if !backend.container_exists()? {
        bail!("container \"{}\" not found", config.container);
    }

    let scratch = ScratchStore::init(&config.scratch_dir).with_context(|| {
        format!("cannot prepare scratch directory {}", config.scratch_dir.display())
    })?;
    debug!("scratch directory ready at {}", scratch.root().display());

    debug!("create mapper");
    let mut mapper = ObjectMapper::new(backend, scratch, config.stats_cache_ttl);
    mapper.sync().context("initial container sync failed")?;

    info!("mounting \"{}\" at {}", config.container, config.mountpoint.display());
    let options = vec![
        MountOption::FSName(APP_NAME.to_string()),
        MountOption::AutoUnmount,
    ];
    fuser::mount2(FsWrapper::new(ObjectFs::new(mapper)), &config.mountpoint, &options)
        .context("mount failed")?;

    debug!("shutdown");
    Ok(())
}
