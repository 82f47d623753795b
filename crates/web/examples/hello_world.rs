use plover_web::router::get;
use plover_web::{Server, handler_fn};

async fn hello_world() -> &'static str {
    "Hello, World!"
}

fn main() {
    Server::builder()
        .bind("127.0.0.1:3000")
        .serve(get("/", handler_fn(hello_world)))
        .build()
        .expect("server configuration is valid")
        .run(4);
}
