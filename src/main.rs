use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use comfy_table::{modifiers, presets, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use terminal_size::{terminal_size, Width};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use yansi::Paint;

use fleetdesk::config::{self, ProvisionConfig, DEFAULT_HOST, DEFAULT_PORT};
use fleetdesk::models::{AppState, NewLocation, ProviderLocation};
use fleetdesk::provision::{
    run_dialog, validate_install_form, ControllerError, DialogAction, DialogObserver,
    DialogOutcome, DialogSnapshot, LocationPicker, LocationResolver, Phase,
    ProvisioningController, RawInstallForm, SessionErrorKind, StaticToken, StdoutSink,
    ValidationError, WsConnector,
};
use fleetdesk::routes::build_router;

const EXIT_VALIDATION: i32 = 1;
const EXIT_CANCELLED: i32 = 2;

fn build_state_from_env(env_file: Option<&str>) -> AppState {
    config::load_env_file(env_file);

    let client = match reqwest::Client::builder()
        .user_agent(format!("fleetdesk/{}", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", Paint::red("Failed to create HTTP client"), e);
            process::exit(1);
        }
    };
    let api_token = config::get_api_token();
    let provision = ProvisionConfig::from_env();

    AppState {
        api_base_url: config::get_api_base_url(),
        api_token: api_token.clone(),
        client,
        connector: Arc::new(WsConnector::new(provision.clone())),
        credentials: Arc::new(StaticToken::new(api_token)),
        provision,
    }
}

async fn start_server(state: AppState, host: &str, port: u16) {
    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(%e, "Invalid host/port format");
            eprintln!("{}: {}", Paint::red("Invalid host/port format"), e);
            process::exit(1);
        }
    };
    tracing::info!(%addr, ws_url = %state.provision.ws_url, "Starting fleetdesk console");
    let app = build_router(state);
    println!(
        "{} {}",
        Paint::new("Web console running on").green(),
        Paint::new(format!("http://{}/workers/install", addr)).cyan()
    );
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(%e, "Server encountered an error while running");
                eprintln!("{}: {}", Paint::new("Server error").red(), e);
                process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(%e, "Failed to bind to address; is the port already in use?");
            eprintln!(
                "{}: {}\n{}",
                Paint::new(format!("Failed to bind to {}", addr)).red(),
                e,
                Paint::new("Stop the process using this port, or pass a different --port value.")
                    .yellow()
            );
            process::exit(1);
        }
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if let Some((Width(w), _)) = terminal_size() {
        table.set_width(w.saturating_sub(4));
    }
    table
}

fn print_locations(locations: &[ProviderLocation]) {
    if locations.is_empty() {
        println!("(no locations)");
        return;
    }
    let mut table = new_table();
    table.set_header(vec!["ID", "Location", "Country", "State", "Coordinates"]);
    for l in locations {
        table.add_row(vec![
            l.id.to_string(),
            l.label(),
            l.country.clone(),
            l.state.clone().unwrap_or_default(),
            l.coordinates(),
        ]);
    }
    println!("\n{table}\n");
}

fn print_validation(errors: &ValidationError) {
    eprintln!("{}", Paint::red("The installation request is invalid:").bold());
    let mut table = new_table();
    table.set_header(vec!["Field", "Problem"]);
    for (field, message) in &errors.fields {
        table.add_row(vec![field.as_str(), message.as_str()]);
    }
    eprintln!("\n{table}\n");
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn fail(message: impl std::fmt::Display, code: i32) -> ! {
    eprintln!("{}", Paint::red(&message.to_string()));
    process::exit(code);
}

#[derive(Parser)]
#[command(
    name = "fleetdesk",
    author,
    version,
    about = "fleetdesk hardware provisioning console",
    long_about = r#"fleetdesk: install and register worker hosts from your inventory console.

Run the web console, inspect providers and their locations, or drive a
worker installation straight from the terminal. API credentials and the
installation service endpoint come from environment variables or an
`--env-file`.

Examples:
  1) Run the console:
      fleetdesk serve --host 127.0.0.1 --port 8080
  2) Install a worker interactively:
      fleetdesk install --ipv4 10.0.0.5 --username root --password x \
        --provider 1 --location 7 --contact-person Ana --contact-phone 0712345678
"#,
    after_help = "Use `fleetdesk <subcommand> --help` to get subcommand specific options."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Disable colorized output
    #[arg(long, global = true)]
    no_color: bool,
    /// Disable request/response logging
    #[arg(long, global = true)]
    silent: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web console
    Serve {
        /// Host to bind to
        #[arg(long, default_value_t = String::from(DEFAULT_HOST))]
        host: String,
        /// Port to bind to
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Path to .env file
        #[arg(long)]
        env_file: Option<String>,
    },
    #[command(
        about = "Validate configuration and ensure API connectivity.",
        long_about = "Check the inventory API and installation service settings, \
                      then validate the API token by listing providers."
    )]
    CheckConfig {
        #[arg(long)]
        env_file: Option<String>,
    },
    /// Inventory providers
    Providers {
        #[command(subcommand)]
        sub: ProviderCommands,
    },
    /// Provider locations
    Locations {
        #[command(subcommand)]
        sub: LocationCommands,
    },
    #[command(
        about = "Install a worker host interactively",
        long_about = "Validate the parameters, run the remote installation and stream its \
                      output. While the dialog runs, type `:commit [hardware-id]` to save the \
                      worker, `:reinstall` to run the install again, `:resubmit` to start over \
                      after a failed install, `:cancel` to abort. Any other line is sent to the \
                      remote terminal. Exit codes: 0 saved, 1 invalid input or failed install, \
                      2 cancelled."
    )]
    Install(InstallArgs),
}

#[derive(Subcommand)]
enum ProviderCommands {
    #[command(about = "List providers")]
    List {
        #[arg(long)]
        env_file: Option<String>,
    },
}

#[derive(Subcommand)]
enum LocationCommands {
    #[command(about = "List the locations of a provider")]
    List {
        #[arg(long)]
        provider: i64,
        #[arg(long)]
        env_file: Option<String>,
    },
    #[command(about = "Register a new location under a provider")]
    Create {
        #[arg(long)]
        provider: i64,
        #[command(flatten)]
        location: NewLocationArgs,
        #[arg(long)]
        env_file: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct NewLocationArgs {
    #[arg(long)]
    continent: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    country_code: String,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    city: String,
    #[arg(long, default_value = "")]
    data_center: String,
    #[arg(long, allow_hyphen_values = true)]
    latitude: f64,
    #[arg(long, allow_hyphen_values = true)]
    longitude: f64,
}

impl From<NewLocationArgs> for NewLocation {
    fn from(a: NewLocationArgs) -> Self {
        NewLocation {
            continent: a.continent,
            country: a.country,
            country_code: a.country_code,
            state: a.state,
            city: a.city,
            data_center: a.data_center,
            latitude: a.latitude,
            longitude: a.longitude,
        }
    }
}

#[derive(Args, Debug)]
struct InstallArgs {
    #[arg(long)]
    ipv4: Option<String>,
    #[arg(long)]
    ipv6: Option<String>,
    /// SSH port; 22 when omitted
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Provider id
    #[arg(long)]
    provider: i64,
    /// Existing location id; omit and pass --new-city etc. to create one
    #[arg(long, conflicts_with = "new_city")]
    location: Option<i64>,
    #[arg(long, requires_all = ["new_continent", "new_country", "new_country_code"])]
    new_city: Option<String>,
    #[arg(long)]
    new_continent: Option<String>,
    #[arg(long)]
    new_country: Option<String>,
    #[arg(long)]
    new_country_code: Option<String>,
    #[arg(long)]
    new_state: Option<String>,
    #[arg(long)]
    new_data_center: Option<String>,
    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    new_latitude: f64,
    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    new_longitude: f64,
    #[arg(long)]
    contact_person: Option<String>,
    #[arg(long)]
    contact_phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
    /// Hardware asset being installed
    #[arg(long)]
    hardware_id: Option<String>,
    #[arg(long)]
    env_file: Option<String>,
}

impl InstallArgs {
    fn form(&self) -> RawInstallForm {
        RawInstallForm {
            ipv4: self.ipv4.clone(),
            ipv6: self.ipv6.clone(),
            port: self.port.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            contact_person: self.contact_person.clone(),
            contact_phone: self.contact_phone.clone(),
            address: self.address.clone(),
            hardware_id: self.hardware_id.clone(),
        }
    }

    fn new_location(&self) -> Option<NewLocation> {
        let city = self.new_city.clone()?;
        Some(NewLocation {
            continent: self.new_continent.clone().unwrap_or_default(),
            country: self.new_country.clone().unwrap_or_default(),
            country_code: self.new_country_code.clone().unwrap_or_default(),
            state: self.new_state.clone(),
            city,
            data_center: self.new_data_center.clone().unwrap_or_default(),
            latitude: self.new_latitude,
            longitude: self.new_longitude,
        })
    }
}

/// Turn one line typed by the operator into dialog actions.
fn parse_operator_line(line: &str) -> Result<Vec<DialogAction>, String> {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix(':') else {
        return Ok(vec![DialogAction::Input(format!("{}\n", line))]);
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("commit"), None) => Ok(vec![DialogAction::Commit { hardware_id: None }]),
        (Some("commit"), Some(id)) => match id.parse::<u64>() {
            Ok(id) if id > 0 => Ok(vec![DialogAction::Commit { hardware_id: Some(id) }]),
            _ => Err(format!("`{}` is not a hardware id", id)),
        },
        (Some("reinstall"), None) => Ok(vec![DialogAction::Reinstall]),
        (Some("resubmit"), None) => Ok(vec![DialogAction::Resubmit]),
        (Some("cancel"), None) => Ok(vec![DialogAction::Cancel, DialogAction::Close]),
        _ => Err(format!(
            "Unknown command `:{}` (try :commit, :reinstall, :resubmit, :cancel)",
            command
        )),
    }
}

async fn read_operator(actions: mpsc::UnboundedSender<DialogAction>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_operator_line(&line) {
            Ok(list) => {
                for action in list {
                    if actions.send(action).is_err() {
                        return;
                    }
                }
            }
            Err(message) => eprintln!("{}", Paint::yellow(&message)),
        }
    }
    let _ = actions.send(DialogAction::Close);
}

/// Prints what changed in the dialog.
#[derive(Default)]
struct CliObserver {
    last: Option<DialogSnapshot>,
    saving: Option<ProgressBar>,
}

impl DialogObserver for CliObserver {
    fn changed(&mut self, snapshot: &DialogSnapshot) {
        let previous = self.last.replace(snapshot.clone());
        let phase_changed = previous.as_ref().map_or(true, |p| p.phase != snapshot.phase);

        if let Some(pb) = self.saving.take() {
            if snapshot.phase == Phase::Saving {
                self.saving = Some(pb);
            } else {
                pb.finish_and_clear();
            }
        }
        if phase_changed {
            let label = Paint::new(snapshot.phase.label()).bold();
            eprintln!("{} {}", Paint::cyan("==>").bold(), label);
            match snapshot.phase {
                Phase::InstallSucceeded => eprintln!(
                    "{}",
                    Paint::green(
                        "Install finished. Type :commit [hardware-id] to save, \
                         :reinstall to run again."
                    )
                ),
                Phase::Interrupted => eprintln!(
                    "{}",
                    Paint::yellow(
                        "Install interrupted. Type :reinstall to retry or :cancel to abort."
                    )
                ),
                Phase::Form if install_failed(snapshot) => eprintln!(
                    "{}",
                    Paint::yellow(
                        "Install failed. Type :resubmit to try again or :cancel to abort."
                    )
                ),
                Phase::Saving => self.saving = Some(spinner("Saving worker to inventory...")),
                _ => {}
            }
        }
        let previous_error = previous.as_ref().and_then(|p| p.last_error.as_ref());
        if let Some(error) = snapshot.last_error.as_ref().filter(|e| Some(*e) != previous_error) {
            eprintln!("{} {}", Paint::red("error:").bold(), error.message);
        }
        let previous_warning = previous.as_ref().and_then(|p| p.warning.as_ref());
        if let Some(warning) = snapshot.warning.as_ref().filter(|w| Some(*w) != previous_warning) {
            eprintln!("{} {}", Paint::yellow("warning:").bold(), warning);
        }
    }

    fn rejected(&mut self, error: &ControllerError) {
        eprintln!("{} {}", Paint::red("rejected:").bold(), error);
    }
}

fn install_failed(snapshot: &DialogSnapshot) -> bool {
    snapshot.phase == Phase::Form
        && snapshot
            .last_error
            .as_ref()
            .is_some_and(|e| e.kind == SessionErrorKind::RemoteInstall)
}

/// Exit code and closing line for a finished dialog. A dialog closed while
/// sitting on a failed install reports that failure, not a cancellation.
fn final_report(outcome: &DialogOutcome, last: &DialogSnapshot) -> (i32, String) {
    match outcome {
        DialogOutcome::Saved { message } => (0, message.clone()),
        DialogOutcome::Closed if install_failed(last) => {
            let reason = last.last_error.as_ref().map_or("", |e| e.message.as_str());
            (EXIT_VALIDATION, format!("Installation failed: {}", reason))
        }
        DialogOutcome::Cancelled | DialogOutcome::Closed => {
            (EXIT_CANCELLED, "Installation cancelled".to_string())
        }
    }
}

async fn resolve_location<R: LocationResolver>(
    picker: &mut LocationPicker,
    resolver: &R,
    args: &InstallArgs,
) -> Result<(), String> {
    let pb = spinner("Loading provider locations...");
    let loaded = picker.select_provider(resolver, args.provider).await.map(|_| ());
    pb.finish_and_clear();
    loaded.map_err(|e| e.to_string())?;

    if let Some(location_id) = args.location {
        picker.select_location(location_id).map_err(|e| e.to_string())?;
    } else if let Some(data) = args.new_location() {
        let pb = spinner("Creating location...");
        let created = picker.create_location(resolver, &data).await.map(|l| l.label());
        pb.finish_and_clear();
        let label = created.map_err(|e| e.to_string())?;
        println!("{} {}", Paint::green("Created location"), label);
    }
    Ok(())
}

async fn run_install(args: InstallArgs) {
    let state = build_state_from_env(args.env_file.as_deref());
    let resolver = state.resolver();
    let mut picker = LocationPicker::new();

    if let Err(message) = resolve_location(&mut picker, &resolver, &args).await {
        fail(message, EXIT_VALIDATION);
    }
    let request = match validate_install_form(&args.form(), picker.provider(), picker.location()) {
        Ok(request) => request,
        Err(errors) => {
            print_validation(&errors);
            process::exit(EXIT_VALIDATION);
        }
    };

    let (mut controller, mut events) = ProvisioningController::new(
        state.connector.clone(),
        state.credentials.clone(),
        Arc::new(StdoutSink),
    );
    let (action_tx, mut action_rx) = mpsc::unbounded_channel();
    if action_tx.send(DialogAction::Submit(Box::new(request))).is_err() {
        fail("Dialog could not be started", 1);
    }
    tokio::spawn(read_operator(action_tx));

    let mut observer = CliObserver::default();
    let outcome = run_dialog(&mut controller, &mut events, &mut action_rx, &mut observer).await;
    let last = observer.last.unwrap_or_else(|| controller.snapshot());
    let (code, message) = final_report(&outcome, &last);
    match code {
        0 => println!("{}", Paint::green(&message).bold()),
        EXIT_VALIDATION => eprintln!("{}", Paint::red(&message).bold()),
        _ => eprintln!("{}", Paint::yellow(&message)),
    }
    process::exit(code);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        yansi::whenever(yansi::Condition::NEVER);
    }

    if cli.silent {
        fleetdesk::api::set_silent(true);
    }

    // Without a subcommand, serve the console with defaults.
    let Some(command) = cli.command else {
        let state = build_state_from_env(None);
        start_server(state, DEFAULT_HOST, DEFAULT_PORT).await;
        return;
    };
    match command {
        Commands::Serve { host, port, env_file } => {
            let state = build_state_from_env(env_file.as_deref());
            start_server(state, &host, port).await;
        }
        Commands::CheckConfig { env_file } => {
            let state = build_state_from_env(env_file.as_deref());
            let mut ok = true;
            if state.api_token.trim().is_empty() {
                eprintln!("{}", Paint::new("API_TOKEN is not configured").red());
                ok = false;
            }
            let ws_url = &state.provision.ws_url;
            if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
                let problem = Paint::new("PROVISION_WS_URL must be a ws:// or wss:// URL").red();
                eprintln!("{}: {}", problem, ws_url);
                ok = false;
            }
            if !ok {
                process::exit(1);
            }
            println!(
                "{} {} ({} reconnects, {}ms apart)",
                Paint::new("Installation service:").bold(),
                ws_url,
                state.provision.max_reconnects,
                state.provision.reconnect_delay.as_millis()
            );
            match state.resolver().list_providers().await {
                Ok(providers) => {
                    let summary = format!(
                        "Configuration looks valid ({} providers returned)",
                        providers.len()
                    );
                    println!("{}", Paint::new(summary).green());
                }
                Err(e) => fail(format!("Configuration appears invalid: {}", e), 1),
            }
        }
        Commands::Providers { sub } => match sub {
            ProviderCommands::List { env_file } => {
                let state = build_state_from_env(env_file.as_deref());
                match state.resolver().list_providers().await {
                    Ok(providers) => {
                        let mut table = new_table();
                        table.set_header(vec!["ID", "Name"]);
                        for p in &providers {
                            table.add_row(vec![p.id.to_string(), p.name.clone()]);
                        }
                        println!("\n{table}\n");
                    }
                    Err(e) => fail(e, 1),
                }
            }
        },
        Commands::Locations { sub } => match sub {
            LocationCommands::List { provider, env_file } => {
                let state = build_state_from_env(env_file.as_deref());
                match state.resolver().list_locations(provider).await {
                    Ok(locations) => print_locations(&locations),
                    Err(e) => fail(e, 1),
                }
            }
            LocationCommands::Create { provider, location, env_file } => {
                let state = build_state_from_env(env_file.as_deref());
                let data = NewLocation::from(location);
                match state.resolver().create_location(provider, &data).await {
                    Ok(created) => {
                        println!("{} {}", Paint::green("Location created:"), created.label());
                        print_locations(std::slice::from_ref(&created));
                    }
                    Err(e) => fail(e, 1),
                }
            }
        },
        Commands::Install(args) => run_install(args).await,
    }
}
