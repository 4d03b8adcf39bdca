use peasant::{
    api, AsyncPeasant, DirectoryUrl, Peasant, ReqwestTransport, Transport as _, UreqTransport,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let url = DirectoryUrl::LetsEncryptStaging;

    log::info!("fetching directory with the async client");
    let client = AsyncPeasant::new(ReqwestTransport::new(&url)?);

    let directory = client
        .directory()
        .await?
        .ok_or_else(|| eyre::eyre!("transport did not populate the directory"))?;
    let typed = directory.decode::<api::Directory>()?;
    log::info!("newAccount endpoint: {}", typed.new_account);

    if let Some(tos) = typed.meta.as_ref().and_then(|meta| meta.terms_of_service.as_ref()) {
        log::info!("terms of service: {tos}");
    }

    log::info!("fresh nonce: {}", client.new_nonce().await?);

    log::info!("repeating with the blocking client");
    let nonce = tokio::task::spawn_blocking(move || -> eyre::Result<String> {
        let client = Peasant::new(UreqTransport::new(url)?);
        let res = client.transport().get("", Default::default())?;
        log::info!("directory status: {}", res.status());

        Ok(client.new_nonce()?)
    })
    .await??;
    log::info!("fresh nonce: {nonce}");

    Ok(())
}
