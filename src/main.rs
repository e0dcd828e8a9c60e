mod client;
mod config;
mod prompt;
mod resolve;

use crate::client::AdminClient;
use crate::config::{EffectiveConfig, Scope};
use crate::prompt::{SelectionError, read_line};
use crate::resolve::DeviceCandidate;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(
    name = "serialctl",
    version,
    about = "Interactive serial number lookup against the ConfigMgr AdminService"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "HOST",
        help = "AdminService host override for this invocation (otherwise read from config)"
    )]
    server: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "CODE",
        help = "Site code override (informational, shown in the banner)"
    )]
    site_code: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Skip TLS certificate verification (self-signed lab certs)"
    )]
    insecure: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist the server and site code to the chosen scope
    Configure {
        #[arg(long, value_name = "HOST")]
        server: Option<String>,
        #[arg(long, value_name = "CODE")]
        site_code: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration
    ConfigShow,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Clone, Copy)]
enum SearchMode {
    Hostname,
    User,
}

struct ResultRow {
    hostname: String,
    serial: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("reading current directory")?;

    match cli.command {
        Some(Commands::Configure {
            server,
            site_code,
            scope,
        }) => {
            let mut existing = config::load_scope(scope.into(), &cwd)?;
            if let Some(server) = server {
                existing.server = Some(server);
            }
            if let Some(code) = site_code {
                existing.site_code = Some(code);
            }
            let path = config::save(scope.into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
            Ok(())
        }
        Some(Commands::ConfigShow) => {
            let merged = config::load(&cwd)?;
            print!("{}", serde_yaml::to_string(&merged)?);
            Ok(())
        }
        None => {
            let effective = config::resolve(&cwd, cli.server, cli.site_code, cli.insecure)?;
            let client = AdminClient::new(&effective.base_url(), effective.verify_tls)?;
            let stdin = io::stdin();
            run_loop(&client, &effective, &mut stdin.lock(), &mut io::stdout())
        }
    }
}

/// Main menu. Each iteration is independent: any error raised inside one is
/// caught here, printed as a single line, and the menu comes back. A blank
/// line (or end of input) is the only exit path.
fn run_loop(
    client: &AdminClient,
    effective: &EffectiveConfig,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<()> {
    match &effective.site_code {
        Some(code) => writeln!(output, "Connected to {} (site {code})", effective.server)?,
        None => writeln!(output, "Connected to {}", effective.server)?,
    }

    loop {
        writeln!(output)?;
        writeln!(output, "  [1] search by hostname")?;
        writeln!(output, "  [2] search by primary user")?;
        write!(output, "mode (blank to exit): ")?;
        output.flush()?;

        let Some(line) = read_line(input)? else {
            break;
        };
        let mode = line.trim();
        if mode.is_empty() {
            break;
        }

        let outcome = match mode {
            "1" => run_search(client, SearchMode::Hostname, input, output),
            "2" => run_search(client, SearchMode::User, input, output),
            other => Err(SelectionError {
                input: other.to_string(),
            }
            .into()),
        };
        if let Err(err) = outcome {
            writeln!(output, "error: {err:#}")?;
        }
    }

    Ok(())
}

/// One search iteration: read the search text, resolve candidates,
/// disambiguate, look up a serial per selection, print the table.
fn run_search(
    client: &AdminClient,
    mode: SearchMode,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<()> {
    match mode {
        SearchMode::Hostname => write!(output, "hostname fragment: ")?,
        SearchMode::User => write!(output, "username: ")?,
    }
    output.flush()?;
    let term = read_line(input)?.unwrap_or_default();

    let candidates = match mode {
        SearchMode::Hostname => resolve::find_by_hostname(client, &term)?,
        SearchMode::User => resolve::find_by_username(client, &term)?,
    };
    if candidates.is_empty() {
        writeln!(output, "No matching devices found.")?;
        return Ok(());
    }

    let selected = prompt::disambiguate(candidates, DeviceCandidate::label, input, output)?;

    let mut rows = Vec::with_capacity(selected.len());
    for candidate in &selected {
        let serial = resolve::resolve_serial(client, candidate.resource_id)?;
        rows.push(ResultRow {
            hostname: candidate.name.clone(),
            serial,
        });
    }
    print_table(output, &rows)?;
    Ok(())
}

fn print_table(output: &mut impl Write, rows: &[ResultRow]) -> io::Result<()> {
    let headers = ["Hostname", "SerialNumber"];
    let mut widths = [headers[0].len(), headers[1].len()];
    for row in rows {
        widths[0] = widths[0].max(row.hostname.len());
        widths[1] = widths[1].max(row.serial.len());
    }

    writeln!(
        output,
        "{:w0$}  {:w1$}",
        headers[0],
        headers[1],
        w0 = widths[0],
        w1 = widths[1]
    )?;
    writeln!(
        output,
        "{:-<w0$}  {:-<w1$}",
        "",
        "",
        w0 = widths[0],
        w1 = widths[1]
    )?;
    for row in rows {
        writeln!(
            output,
            "{:w0$}  {:w1$}",
            row.hostname,
            row.serial,
            w0 = widths[0],
            w1 = widths[1]
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::SERIAL_FALLBACK;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Cursor;

    fn client(server: &MockServer) -> AdminClient {
        AdminClient::new(&format!("{}/AdminService/wmi", server.base_url()), true).unwrap()
    }

    #[test]
    fn print_table_pads_columns() {
        let rows = vec![
            ResultRow {
                hostname: "Lab-01".into(),
                serial: "SN001".into(),
            },
            ResultRow {
                hostname: "Lab-02-long-name".into(),
                serial: SERIAL_FALLBACK.into(),
            },
        ];
        let mut output = Vec::new();
        print_table(&mut output, &rows).unwrap();
        let rendered = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("Hostname"));
        assert!(lines[1].starts_with("----"));
        assert!(lines[2].contains("SN001"));
        assert!(lines[3].contains(SERIAL_FALLBACK));
    }

    #[test]
    fn hostname_search_select_all_renders_both_serials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/AdminService/wmi/SMS_R_System")
                .query_param("$filter", "contains(Name,'Lab')");
            then.status(200).json_body(json!({"value": [
                {"Name": "Lab-01", "ResourceId": 101},
                {"Name": "Lab-02", "ResourceId": 102}
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/AdminService/wmi/SMS_G_System_PC_BIOS")
                .query_param("$filter", "ResourceId eq 101");
            then.status(200)
                .json_body(json!({"value": [{"SerialNumber": "SN001"}]}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/AdminService/wmi/SMS_G_System_PC_BIOS")
                .query_param("$filter", "ResourceId eq 102");
            then.status(200)
                .json_body(json!({"value": [{"SerialNumber": null}]}));
        });

        let mut input = Cursor::new("Lab\nA\n");
        let mut output = Vec::new();
        run_search(
            &client(&server),
            SearchMode::Hostname,
            &mut input,
            &mut output,
        )
        .unwrap();

        let rendered = String::from_utf8(output).unwrap();
        assert!(rendered.contains("[0] Lab-01 (ResourceId 101)"));
        assert!(rendered.contains("[1] Lab-02 (ResourceId 102)"));
        let lab01 = rendered.lines().find(|l| l.starts_with("Lab-01")).unwrap();
        assert!(lab01.contains("SN001"));
        let lab02 = rendered.lines().find(|l| l.starts_with("Lab-02")).unwrap();
        assert!(lab02.contains(SERIAL_FALLBACK));
    }

    #[test]
    fn zero_matches_prints_a_message_not_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/AdminService/wmi/SMS_R_System");
            then.status(200).json_body(json!({"value": []}));
        });

        let mut input = Cursor::new("nosuchhost\n");
        let mut output = Vec::new();
        run_search(
            &client(&server),
            SearchMode::Hostname,
            &mut input,
            &mut output,
        )
        .unwrap();
        assert!(
            String::from_utf8(output)
                .unwrap()
                .contains("No matching devices found.")
        );
    }

    #[test]
    fn loop_survives_iteration_errors_and_exits_on_blank() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/AdminService/wmi/SMS_R_System");
            then.status(500).body("boom");
        });

        let effective = EffectiveConfig {
            server: "cm01.corp.example".into(),
            site_code: Some("AB1".into()),
            verify_tls: false,
        };
        // bad mode, then a failing search, then blank to exit
        let mut input = Cursor::new("9\n1\nLab\n\n");
        let mut output = Vec::new();
        run_loop(&client(&server), &effective, &mut input, &mut output).unwrap();

        let rendered = String::from_utf8(output).unwrap();
        assert!(rendered.contains("Connected to cm01.corp.example (site AB1)"));
        assert!(rendered.contains("invalid selection \"9\""));
        assert!(rendered.contains("service error"));
    }

    #[test]
    fn loop_exits_on_end_of_input() {
        let server = MockServer::start();
        let effective = EffectiveConfig {
            server: "cm01.corp.example".into(),
            site_code: None,
            verify_tls: false,
        };
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        run_loop(&client(&server), &effective, &mut input, &mut output).unwrap();
        assert!(
            String::from_utf8(output)
                .unwrap()
                .contains("Connected to cm01.corp.example")
        );
    }
}
