use actix_web::{web, App, HttpServer};

use server::connection::ws_index;
use server::server::spawn_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(4321);

    let srv_tx = spawn_server();

    log::info!(
        "Relay listening on ws://localhost:{}/parties/relay/<room>",
        port
    );

    HttpServer::new(move || {
        App::new()
            .data(srv_tx.clone())
            .route("/parties/relay/{room:.+}", web::get().to(ws_index))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
