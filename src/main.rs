use anyhow::Result;
use log::info;
use phonelink::{PhoneLinkBuilder, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    phonelink::utils::logging::init();

    let settings = Settings::load();
    let engine = PhoneLinkBuilder::new(settings).build()?;

    info!("Local identity: {}", engine.identity());
    engine.start().await?;

    let (code, _public_key) = engine.generate_pairing_code().await;
    if let Some(advertisement) = engine.pairing_advertisement().await {
        info!(
            "Pairing code {} ready, advertisement: {}",
            code,
            advertisement.to_json()?
        );
    }

    engine.wait_for_stop().await?;
    Ok(())
}
