//! Canned HTTP upstream for exercising the remote collaborators.

use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer};
use std::net::TcpListener;

/// Serve `body` with `status` for every request on a free local port.
///
/// Must be called inside an actix runtime (`#[actix_web::test]`). Returns the base URL.
pub fn spawn_upstream(status: StatusCode, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind a local port");
    let addr = listener.local_addr().expect("local address");

    let server = HttpServer::new(move || {
        App::new().default_service(web::to(move || async move {
            HttpResponse::build(status)
                .content_type("application/json")
                .body(body)
        }))
    })
    .workers(1)
    .disable_signals()
    .listen(listener)
    .expect("listen on the bound port")
    .run();

    actix_web::rt::spawn(server);
    format!("http://{}", addr)
}
