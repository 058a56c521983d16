mod cli;

use anyhow::Context;
use telegram_fuse::{ChannelClient, Cipher, Config, Driver, FsMount, MetaDb, MountConfig};

fn main() -> anyhow::Result<()> {
    // a missing .env file is fine; the variables may come from the caller
    dotenvy::dotenv().ok();

    let args = argh::from_env::<cli::CliArgs>();
    args.init_logger()?;
    let config = Config::from_env();

    let db = MetaDb::open(&config.db_path).with_context(|| {
        format!(
            "failed to open metadata store at {}",
            config.db_path.display()
        )
    })?;
    let store = args.store()?;
    let cipher = config.encryption_key.as_deref().map(Cipher::new);
    let client = ChannelClient::new(store, cipher, config.cache_max_bytes);

    if let Some(credentials) = &config.credentials {
        log::info!(
            "channel session `{}` targeting {}",
            credentials.session_name,
            credentials.channel_link
        );
    }

    let driver = Driver::new(db, client);
    let mount_config = MountConfig {
        volume: args.volume.clone(),
        kernel_debug: args.debug_fuse,
    };
    let (mut mount, mut unmounter) = FsMount::mount(driver, &args.mountpoint, &mount_config)
        .context("failed to mount filesystem")?;

    // setup signal handler
    ctrlc::set_handler(move || {
        log::info!("received SIGINT, unmounting filesystem");
        unmounter.unmount().expect("failed to unmount");
    })?;

    log::info!("running filesystem event loop");
    mount.run()?;

    Ok(())
}
