use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ugig_core::{PriceRange, RoleScope};
use ugig_directory::{
    catalog_path_from_env, load_catalog_or_builtin, BrowseSession, LoadPhase,
    ProfileDirectoryLoader,
};
use ugig_storage::{StoreConfig, StoreProvider};

#[derive(Debug, Parser)]
#[command(name = "ugig-cli")]
#[command(about = "Campus freelance directory command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a scope and print the profiles that pass the given filters.
    Browse(BrowseArgs),
    /// Print the skill facet for a scope.
    Facets {
        #[arg(long, default_value = "freelancer")]
        scope: RoleScope,
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the configured majors and payment methods.
    Catalog {
        #[arg(long)]
        search: Option<String>,
    },
    Serve,
}

#[derive(Debug, Args)]
struct BrowseArgs {
    #[arg(long, default_value = "freelancer")]
    scope: RoleScope,
    #[arg(long)]
    search: Option<String>,
    #[arg(long = "major")]
    majors: Vec<String>,
    #[arg(long = "skill")]
    skills: Vec<String>,
    #[arg(long = "payment")]
    payment_methods: Vec<String>,
    #[arg(long)]
    min_rate: Option<f64>,
    #[arg(long)]
    max_rate: Option<f64>,
    /// Accepted for parity with the browse page; profiles carry no rating.
    #[arg(long)]
    min_rating: Option<f64>,
    /// Print matches as JSON instead of one line per profile.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Browse(args) => browse(args).await?,
        Commands::Facets { scope, search } => {
            let mut session = BrowseSession::new(scope);
            refresh(&mut session, &loader_from_env().await?, scope).await?;
            for skill in session.skill_options(search.as_deref().unwrap_or_default()) {
                println!("{skill}");
            }
        }
        Commands::Catalog { search } => {
            let catalog = load_catalog_or_builtin(&catalog_path_from_env())?;
            println!("majors:");
            for major in catalog.search_majors(search.as_deref().unwrap_or_default()) {
                println!("  {major}");
            }
            println!("payment methods:");
            for method in &catalog.payment_methods {
                println!("  {method}");
            }
        }
        Commands::Serve => ugig_web::serve_from_env().await?,
    }

    Ok(())
}

async fn loader_from_env() -> Result<ProfileDirectoryLoader> {
    let config = StoreConfig::from_env().context("reading store configuration")?;
    let store = StoreProvider::connect(&config).await?;
    Ok(ProfileDirectoryLoader::new(store))
}

async fn refresh(
    session: &mut BrowseSession,
    loader: &ProfileDirectoryLoader,
    scope: RoleScope,
) -> Result<()> {
    if let LoadPhase::Failed(message) = session.refresh(loader, scope).await {
        bail!("{message}");
    }
    Ok(())
}

async fn browse(args: BrowseArgs) -> Result<()> {
    let loader = loader_from_env().await?;
    let mut session = BrowseSession::new(args.scope);
    {
        let criteria = session.criteria_mut();
        criteria.set_search_term(args.search.clone().unwrap_or_default());
        for major in &args.majors {
            criteria.toggle_major(major);
        }
        for skill in &args.skills {
            criteria.toggle_skill(skill);
        }
        for method in &args.payment_methods {
            criteria.toggle_payment_method(method);
        }
        if args.min_rate.is_some() || args.max_rate.is_some() {
            criteria.set_price_range(Some(PriceRange::new(
                args.min_rate.unwrap_or(0.0),
                args.max_rate.unwrap_or(f64::MAX),
            )));
        }
        criteria.set_min_rating(args.min_rating);
    }
    refresh(&mut session, &loader, args.scope).await?;

    let matches = session.view();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    for p in &matches {
        let rate = if args.scope.has_price_facet() {
            format!(" ${:.2}/hr", p.hourly_rate)
        } else {
            String::new()
        };
        println!(
            "{:<24} {:<24} {}{} [{}]",
            p.full_name(),
            p.major,
            p.academic_year,
            rate,
            p.skills.join(", ")
        );
    }
    println!(
        "{} of {} {} profiles",
        matches.len(),
        session.profiles().len(),
        args.scope
    );
    Ok(())
}
