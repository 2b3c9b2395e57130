use lambda_runtime::Error;
use tenant_isolation_lambda::runtime::run_seed;

#[tokio::main]
async fn main() -> Result<(), Error> {
    run_seed().await
}
