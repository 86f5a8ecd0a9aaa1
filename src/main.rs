use anyhow::Result;
use dotenv::dotenv;
use structopt::StructOpt;
use todo_api::Config;

#[async_std::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tide::log::start();

    let config = Config::from_args();
    if let Err(e) = todo_api::run(config).await {
        tide::log::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}
