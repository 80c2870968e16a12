use std::error::Error;
use std::sync::Arc;

use warp::Filter;

use backend::config::get_variable;
use backend::db::PgDb;
use backend::environment::{Config, Environment};
use backend::routes;
use backend::store::FsStore;
use backend::urls::Urls;
use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let media_dir = get_variable("BACKEND_MEDIA_DIR");
    let store =
        Arc::new(FsStore::new(&media_dir).expect("initialize media store from BACKEND_MEDIA_DIR"));

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let media_path = get_variable("BACKEND_MEDIA_PATH");
    let urls = Arc::new(Urls::new(
        get_variable("BACKEND_BASE_URL"),
        get_variable("BACKEND_RECIPES_PATH"),
        media_path.clone(),
    ));

    let config = Config::new(
        get_variable("BACKEND_PAGE_SIZE")
            .parse()
            .expect("parse BACKEND_PAGE_SIZE as u32"),
        get_variable("BACKEND_POPULAR_PAGE_SIZE")
            .parse()
            .expect("parse BACKEND_POPULAR_PAGE_SIZE as u32"),
    );
    let environment = Environment::new(logger.clone(), db, urls, store, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate =
        Arc::new(move || {
            let termination_sender = termination_sender.clone();

            async move {
            let termination_sender = termination_sender.clone();
                termination_sender.send(()).await.unwrap();
            }
            .boxed()
        });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            let terminate = terminate.clone();

            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate();
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let list_route = routes::make_list_route(environment.clone());
        let popular_route = routes::make_popular_route(environment.clone());
        let my_recipes_route = routes::make_my_recipes_route(environment.clone());
        let favorites_route = routes::make_favorites_route(environment.clone());
        let create_route = routes::make_create_route(environment.clone());
        let rate_route = routes::make_rate_route(environment.clone());
        let add_favorite_route = routes::make_add_favorite_route(environment.clone());
        let remove_favorite_route = routes::make_remove_favorite_route(environment.clone());
        let update_route = routes::make_update_route(environment.clone());
        let delete_route = routes::make_delete_route(environment.clone());
        let retrieve_route = routes::make_retrieve_route(environment.clone());
        let media_route = warp::path(media_path).and(warp::fs::dir(media_dir));

        // fixed segments before the `:id` parameter routes
        let routes = list_route
            .or(popular_route)
            .or(my_recipes_route)
            .or(favorites_route)
            .or(create_route)
            .or(rate_route)
            .or(add_favorite_route)
            .or(remove_favorite_route)
            .or(update_route)
            .or(delete_route)
            .or(retrieve_route)
            .or(media_route)
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
