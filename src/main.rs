use std::env;

use nestegg::core::InMemoryStateTaxTable;

#[tokio::main]
async fn main() {
    env_logger::init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            let states = match raw_args.get(3) {
                Some(path) => match nestegg::api::load_state_table(path) {
                    Ok(table) => table,
                    Err(e) => {
                        eprintln!("{e}");
                        std::process::exit(1);
                    }
                },
                None => InMemoryStateTaxTable::new(),
            };
            if let Err(e) = nestegg::api::run_http_server(port, states).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("report") => {
            let states = InMemoryStateTaxTable::new();
            match nestegg::api::run_report(&raw_args[1..], &states) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("Usage: nestegg serve [port] [state-table.json]");
            eprintln!("       nestegg report [--flags]");
            std::process::exit(1);
        }
    }
}
