use std::env;
use std::process;

use pagedb::tuple::{DataType, TableSchema};
use pagedb::{record, StorageConfig, StorageManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn run(db_dir: &str) -> pagedb::Result<()> {
    let mut storage = StorageManager::open(StorageConfig::new(db_dir).with_index(true))?;

    if storage.get_table_schema("planets").is_none() {
        let (name, attributes) = TableSchema::builder("planets")
            .primary_key("id", DataType::Integer)
            .column("name", DataType::VarChar(16))
            .nullable_column("radius_km", DataType::Double)
            .column("has_rings", DataType::Boolean)
            .into_parts();
        storage.create_table(&name, attributes)?;

        let rows = [
            record![3, "Earth", 6371.0, false],
            record![1, "Mercury", 2439.7, false],
            record![6, "Saturn", 58232.0, true],
            record![4, "Mars", 3389.5, false],
            record![2, "Venus", 6051.8, false],
            record![5, "Jupiter", 69911.0, true],
        ];
        for row in rows {
            storage.insert("planets", row)?;
        }
        info!("inserted demo rows");
    }

    print!("{}", storage.display_schema());
    println!();
    print!("{}", storage.display_table("planets")?);

    storage.close()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let db_dir = env::args().nth(1).unwrap_or_else(|| "./pagedb-data".to_string());

    if let Err(e) = run(&db_dir) {
        error!(error = %e, "pagedb failed");
        process::exit(1);
    }
}
