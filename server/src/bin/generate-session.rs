use std::error::Error;

use dotenv::dotenv;
use log::{info, initialize_logger};
use structopt::StructOpt;
use uuid::Uuid;

use backend::config::get_variable;
use backend::db::PgDb;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "generate-session",
    about = "Create and print session tokens for the given users"
)]
struct Opt {
    /// The user IDs to create sessions for
    #[structopt(parse(try_from_str = Uuid::parse_str))]
    ids: Vec<Uuid>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = initialize_logger();

    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = PgDb::new(pool);

    for id in &opt.ids {
        use backend::db::Db;

        let logger = logger.new(log::o!("user" => format!("{}", id)));
        info!(logger, "Creating session...");

        let token = db.create_session(id).await.expect("create session");
        println!("{} {}", id, token);
    }

    Ok(())
}
