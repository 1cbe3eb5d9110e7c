use storefront::{Config, init_tracing, sweep_sessions};

fn print_usage(bin_name: &str) {
    eprintln!("Usage: {bin_name} sweep-sessions");
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let mut args = std::env::args();
    let bin_name = args.next().unwrap_or_else(|| "cron".to_string());
    let command = args.next();

    if command.as_deref() != Some("sweep-sessions") || args.next().is_some() {
        print_usage(&bin_name);
        std::process::exit(2);
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.json_format);

    match sweep_sessions(&config).await {
        Ok(result) => {
            println!("Session sweep completed: tokens_deleted={}", result.tokens_deleted);
        }
        Err(err) => {
            eprintln!("Cron job failed: {err}");
            std::process::exit(1);
        }
    }
}
