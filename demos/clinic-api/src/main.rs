use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let app = clinic_api::build().await?;

    let host = app
        .config
        .get_string("http.host")
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let port = app
        .config
        .get_string("http.port")
        .unwrap_or_else(|| "3030".to_string());

    let addr = format!("{host}:{port}");

    println!("[clinic-api] listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.router).await?;

    Ok(())
}
