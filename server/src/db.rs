use sqlx::Executor;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

/// Postgres-backed implementation of every repository trait in the crate.
#[derive(Clone)]
pub struct Postgre {
    pub pool: PgPool,
}

impl Postgre {
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let schema = config.schema.clone();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .after_connect(move |conn, _meta| {
                let schema = schema.clone();
                Box::pin(async move {
                    conn.execute("SET application_name = 'meetup_server';")
                        .await?;
                    if let Some(schema) = schema {
                        let statement = format!(
                            "CREATE SCHEMA IF NOT EXISTS \"{0}\"; SET search_path TO \"{0}\", public;",
                            schema.replace('"', "")
                        );
                        conn.execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}
