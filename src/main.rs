use anyhow::{bail, Context, Result};
use planetarium::{
    cli::{Cli, Commands, IngestArgs},
    fetch::{Fetcher, HttpTransport},
    filter::PlanetFilter,
    ingest::{run_ingest, IngestOptions},
    parser::{lookup_request, planet_changes, planet_request},
    report::{ConsoleReporter, SilentReporter},
    store::{resolve_db_path, Climate, LookupEntity, Store, Terrain},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose, cli.quiet);

    let quiet = cli.quiet;
    let db_path = resolve_db_path(cli.database.clone())?;

    match cli.into_command() {
        Commands::Ingest(args) => ingest(&args, db_path, quiet)?,

        Commands::Planets {
            search,
            climate,
            terrain,
            json,
        } => {
            let store = open_store(&db_path)?;
            let planets = store.list_planets(&PlanetFilter::new(search, climate, terrain))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&planets)?);
            } else if planets.is_empty() {
                println!("No planets stored");
            } else {
                println!("{:<24} POPULATION", "NAME");
                for planet in planets {
                    println!(
                        "{:<24} {}",
                        planet.name,
                        planet.population.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Show { name, json } => {
            let store = open_store(&db_path)?;
            let Some(detail) = store.planet_detail(&name)? else {
                bail!("No planet named {:?}", name);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                let join = |names: Vec<&str>| {
                    if names.is_empty() {
                        "-".to_string()
                    } else {
                        names.join(", ")
                    }
                };
                println!("{}", detail.planet.name);
                println!(
                    "  population: {}",
                    detail.planet.population.as_deref().unwrap_or("-")
                );
                println!(
                    "  climates:   {}",
                    join(detail.climates.iter().map(|c| c.name.as_str()).collect())
                );
                println!(
                    "  terrains:   {}",
                    join(detail.terrains.iter().map(|t| t.name.as_str()).collect())
                );
                println!("  created:    {}", detail.planet.created_at);
                println!("  updated:    {}", detail.planet.updated_at);
            }
        }

        Commands::Climates => {
            let store = open_store(&db_path)?;
            for usage in store.list_lookups::<Climate>()? {
                println!("  {:<24} {} planets", usage.name, usage.planets);
            }
        }

        Commands::Terrains => {
            let store = open_store(&db_path)?;
            for usage in store.list_lookups::<Terrain>()? {
                println!("  {:<24} {} planets", usage.name, usage.planets);
            }
        }

        Commands::AddPlanet {
            name,
            population,
            climate,
            terrain,
        } => {
            let record = planet_request(&name, population.as_deref(), &climate, &terrain)?;
            let mut store = open_store(&db_path)?;
            let planet = store
                .create_planet(&record)
                .with_context(|| format!("Could not create planet {:?}", record.name))?;
            println!("Created: {}", planet.name);
        }

        Commands::UpdatePlanet {
            name,
            new_name,
            population,
            climate,
            terrain,
        } => {
            let changes = planet_changes(
                new_name.as_deref(),
                population.as_deref(),
                climate.as_deref(),
                terrain.as_deref(),
            )?;
            if changes.is_empty() {
                bail!("Nothing to change: pass --name, --population, --climate or --terrain");
            }
            let mut store = open_store(&db_path)?;
            let Some(planet) = store
                .update_planet(&name, &changes)
                .with_context(|| format!("Could not update planet {:?}", name.trim()))?
            else {
                bail!("No planet named {:?}", name);
            };
            println!("Updated: {}", planet.name);
        }

        Commands::DeletePlanet { name } => {
            let store = open_store(&db_path)?;
            if !store.delete_planet(&name)? {
                bail!("No planet named {:?}", name);
            }
            println!("Deleted: {}", name.trim());
        }

        Commands::AddClimate { name } => add_lookup::<Climate>(&db_path, &name)?,

        Commands::AddTerrain { name } => add_lookup::<Terrain>(&db_path, &name)?,
    }

    Ok(())
}

fn ingest(args: &IngestArgs, db_path: PathBuf, quiet: bool) -> Result<()> {
    let start = Instant::now();

    let transport = HttpTransport::new(args.timeout())?;
    let fetcher = Fetcher::new(transport, &args.base_url, args.page_size, args.retry_policy());
    let mut store = open_store(&db_path)?;
    let options = IngestOptions { mode: args.mode() };

    if !quiet {
        println!("Fetching planets from {} into {:?}", args.base_url, db_path);
    }

    let result = if quiet {
        run_ingest(&fetcher, &mut store, &options, &mut SilentReporter::new())
    } else {
        run_ingest(&fetcher, &mut store, &options, &mut ConsoleReporter::new())
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            let kind = e.kind();
            return Err(e).with_context(|| format!("Ingestion aborted ({})", kind));
        }
    };

    println!("\n{}", summary);
    if !quiet {
        println!("Finished in {:.1}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn add_lookup<L: LookupEntity>(db_path: &Path, name: &str) -> Result<()> {
    let name = lookup_request(name)?;
    let store = open_store(db_path)?;
    let (entity, created) = store.add_lookup::<L>(&name)?;
    if created {
        println!("Created {}: {}", L::ENTITY, entity.name());
    } else {
        println!("Exists {}: {}", L::ENTITY, entity.name());
    }
    Ok(())
}

fn open_store(db_path: &Path) -> Result<Store> {
    Store::open(db_path).with_context(|| format!("Failed to open database {:?}", db_path))
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
