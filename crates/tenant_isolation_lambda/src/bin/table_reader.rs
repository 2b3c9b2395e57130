use lambda_runtime::Error;
use tenant_isolation_core::contract::HandlerKind;
use tenant_isolation_lambda::runtime::run_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    run_handler(HandlerKind::TableReader).await
}
