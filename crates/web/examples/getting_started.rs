//! A small tour of the framework: routes, scopes, extractors, state and
//! middleware.
//!
//! ```bash
//! cargo run --example getting_started
//! curl 'http://127.0.0.1:3000/api/users/alice/films/2024?verbose=1'
//! curl -X POST 'http://127.0.0.1:3000/api/echo' -d 'hello'
//! curl --compressed 'http://127.0.0.1:3000/api/large'
//! ```

use http::Method;
use plover_web::extract::{Path, Query, State};
use plover_web::middleware::{Gzip, Logger};
use plover_web::router::{get, post, scope};
use plover_web::{Server, handler_fn};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Counters {
    requests: AtomicU64,
}

#[derive(Deserialize)]
struct Film {
    user: String,
    year: u16,
}

#[derive(Deserialize)]
struct Options {
    verbose: Option<u8>,
}

async fn filmography(
    method: &Method,
    Path(film): Path<Film>,
    Query(options): Query<Options>,
    State(counters): State<Counters>,
) -> String {
    let count = counters.requests.fetch_add(1, Ordering::Relaxed) + 1;
    if options.verbose.unwrap_or(0) > 0 {
        format!("{} films of {} in {} (request #{count})", method, film.user, film.year)
    } else {
        format!("{}/{}", film.user, film.year)
    }
}

async fn echo(body: String) -> String {
    body
}

async fn large() -> String {
    "a compressible response body ".repeat(512)
}

fn main() {
    Server::builder()
        .bind("127.0.0.1:3000")
        .serve_scope(
            scope("/api")
                .wrap(Logger::new())
                .with_state(Counters { requests: AtomicU64::new(0) })
                .serve(get("/users/{user}/films/{year}", handler_fn(filmography)))
                .serve(post("/echo", handler_fn(echo)))
                .serve(get("/large", handler_fn(large)).wrap(Gzip::new())),
        )
        .client_request_timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("server configuration is valid")
        .run(4);
}
