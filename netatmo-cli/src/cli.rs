use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use netatmo_core::{
    Coordinate, Credential, CredentialStore, GoogleGeocoder, Invocation, MeasureQuery,
    NetatmoClient, Place, PublicDataQuery, Session, SessionManager, bounding_box,
    config::{CONFIG_DIR_ENV, CONFIG_FILE_NAME},
    geo::DEFAULT_REFINEMENT_STEPS,
    public::{self, DEFAULT_TYPES},
    station,
};
use std::path::PathBuf;
use tracing::debug;

use crate::{logging::LogLevel, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "netatmo",
    version,
    about = "Retrieve values from your own Netatmo weather station"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Client ID of your app registered at https://dev.netatmo.com/
    #[arg(long)]
    pub clientid: Option<String>,

    /// Client secret of your app registered at https://dev.netatmo.com/
    #[arg(long)]
    pub clientsecret: Option<String>,

    /// E-mail you log in to Netatmo with. Not saved to the config file.
    #[arg(long)]
    pub email: Option<String>,

    /// Password you log in to Netatmo with. Not saved to the config file.
    #[arg(long)]
    pub password: Option<String>,

    /// API key for the Google Maps Geocoding API.
    #[arg(long = "googleapikey", visible_alias = "key")]
    pub google_api_key: Option<String>,

    /// Directory holding the config file. Defaults to the working directory.
    #[arg(long, env = CONFIG_DIR_ENV)]
    pub config_dir: Option<PathBuf>,

    /// Print the response exactly as Netatmo returned it.
    #[arg(long, global = true)]
    pub raw: bool,

    /// Print parsed data as JSON instead of a table.
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Log verbosity on stderr. Falls back to RUST_LOG, then `warn`.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Retrieve measurements of one of your devices.
    #[command(name = "getmeasure", visible_alias = "m")]
    GetMeasure(MeasureArgs),

    /// Retrieve public station values and averages for an area.
    #[command(name = "getpublicdata", visible_alias = "p")]
    GetPublicData(PublicDataArgs),
}

#[derive(Debug, Args)]
pub struct MeasureArgs {
    /// MAC address of the device.
    #[arg(long = "deviceid", visible_alias = "di")]
    pub device_id: String,

    /// MAC address of the module.
    #[arg(long = "moduleid", visible_alias = "mi")]
    pub module_id: Option<String>,

    /// Timelapse between two measurements: 30min, 1hour, 3hours, 1day, 1week, 1month or max.
    #[arg(long, visible_alias = "sc", default_value = "max")]
    pub scale: String,

    /// Comma-separated measurement types.
    #[arg(
        long = "type",
        visible_alias = "ty",
        default_value = "Temperature,Humidity"
    )]
    pub types: String,

    /// First measurement to retrieve (RFC 3339), e.g. 2018-01-23T12:00:00+09:00.
    #[arg(long = "datebegin", short = 'b')]
    pub date_begin: String,

    /// Last measurement to retrieve (RFC 3339).
    #[arg(long = "dateend", short = 'e')]
    pub date_end: String,

    /// Maximum number of measurements (default and max are 1024).
    #[arg(long, short = 'l', default_value_t = 1024)]
    pub limit: u32,
}

#[derive(Debug, Args)]
pub struct PublicDataArgs {
    /// Place name, postal code or address at the center of the area.
    #[arg(long, short = 'a')]
    pub address: Option<String>,

    /// Center latitude of the area.
    #[arg(
        long,
        visible_alias = "lat",
        allow_negative_numbers = true,
        requires = "longitude"
    )]
    pub latitude: Option<f64>,

    /// Center longitude of the area.
    #[arg(
        long,
        visible_alias = "lon",
        allow_negative_numbers = true,
        requires = "latitude"
    )]
    pub longitude: Option<f64>,

    /// Side of the square area in kilometers.
    #[arg(long, short = 'r', default_value_t = 10.0)]
    pub range: f64,

    /// Only stations with this measurement, e.g. rain.
    #[arg(long = "requireddata", visible_alias = "re")]
    pub required_data: Option<String>,

    /// Exclude stations with abnormal temperature measures.
    #[arg(long, short = 'f')]
    pub filter: bool,

    /// Language of geocoding results (ISO 639-1).
    #[arg(long, visible_alias = "lng", default_value = "en")]
    pub language: String,

    /// Comma-separated values to display.
    #[arg(long = "type", short = 't', default_value = DEFAULT_TYPES)]
    pub types: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Table,
    Json,
    Raw,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        crate::logging::init(self.log_level);

        let started_at = Utc::now();
        let store = CredentialStore::resolve(self.config_dir.clone())?;
        let client = NetatmoClient::new()?;

        let invocation = Invocation::new(started_at)
            .with_credential(self.credential()?)
            .with_google_api_key(self.google_api_key.clone());

        let session = SessionManager::new(&store, &client)
            .ensure_session(&invocation)
            .await?;
        if session.written_to.is_some() {
            eprintln!("{}", updated_message(&store));
        }

        let output = self.output();
        match self.command {
            None => show_stations(&client, &session, output).await,
            Some(Command::GetMeasure(args)) => show_measure(&client, &session, &args).await,
            Some(Command::GetPublicData(args)) => {
                show_public_data(&client, &session, &args, output).await
            }
        }
    }

    fn output(&self) -> Output {
        if self.raw {
            Output::Raw
        } else if self.json {
            Output::Json
        } else {
            Output::Table
        }
    }

    /// Ask for the password when the other three fields are given without it.
    fn credential(&self) -> Result<Option<Credential>> {
        let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

        let mut password = self.password.clone();
        if non_empty(&self.clientid)
            && non_empty(&self.clientsecret)
            && non_empty(&self.email)
            && !non_empty(&password)
        {
            let entered = inquire::Password::new("Netatmo password:")
                .without_confirmation()
                .prompt()
                .context("Failed to read the Netatmo password")?;
            password = Some(entered);
        }

        Ok(Credential::from_parts(
            self.clientid.clone(),
            self.clientsecret.clone(),
            self.email.clone(),
            password,
        ))
    }
}

fn updated_message(store: &CredentialStore) -> String {
    format!("Updated '{CONFIG_FILE_NAME}' at {}.", store.dir().display())
}

async fn show_stations(client: &NetatmoClient, session: &Session, output: Output) -> Result<()> {
    let body = client.stations_data(session.access_token()).await?;
    if output == Output::Raw {
        println!("{body}");
        return Ok(());
    }

    let stations = station::parse_stations(&body)?;
    match output {
        Output::Json => println!("{}", serde_json::to_string(&stations)?),
        _ => {
            for station in &stations.stations {
                print!("{}", render::station_table(station, Utc::now()));
                println!();
            }
        }
    }
    Ok(())
}

async fn show_measure(client: &NetatmoClient, session: &Session, args: &MeasureArgs) -> Result<()> {
    let query = measure_query(args)?;
    let body = client.measure(session.access_token(), &query).await?;
    println!("{body}");
    Ok(())
}

fn measure_query(args: &MeasureArgs) -> Result<MeasureQuery> {
    Ok(MeasureQuery {
        device_id: args.device_id.clone(),
        module_id: args.module_id.clone(),
        scale: args.scale.clone(),
        types: args.types.clone(),
        date_begin: parse_timestamp(&args.date_begin, "--datebegin")?,
        date_end: parse_timestamp(&args.date_end, "--dateend")?,
        limit: args.limit,
    })
}

fn parse_timestamp(value: &str, flag: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .with_context(|| {
            format!("Invalid {flag} '{value}'. Expected e.g. 2018-01-23T12:00:00+09:00")
        })
}

async fn show_public_data(
    client: &NetatmoClient,
    session: &Session,
    args: &PublicDataArgs,
    output: Output,
) -> Result<()> {
    let places = match (&args.address, args.latitude, args.longitude) {
        (Some(address), _, _) if !address.is_empty() => {
            let key = session.google_api_key().ok_or_else(|| {
                anyhow!(
                    "No API key for the Google Maps Geocoding API.\n\
                     Hint: run `netatmo --key <API key>` once to store it."
                )
            })?;
            let places = GoogleGeocoder::new(key.to_string())?
                .geocode(address, &args.language)
                .await?;
            if places.is_empty() {
                bail!("No location found for '{address}'.");
            }
            places
        }
        (_, Some(lat), Some(lon)) => vec![Place {
            formatted_address: String::new(),
            location: Coordinate::new(lat, lon),
        }],
        _ => bail!(
            "Please give an address (--address) or a center (--latitude and --longitude)."
        ),
    };

    let types = public::parse_types(&args.types);
    let has_address = args.address.as_deref().is_some_and(|a| !a.is_empty());
    let show_area = has_address && output == Output::Table;

    for place in places {
        let area = bounding_box(args.range, place.location, DEFAULT_REFINEMENT_STEPS)?;
        debug!(?area, "search area");

        let query = PublicDataQuery {
            area,
            required_data: args.required_data.clone(),
            filter: args.filter,
        };
        let body = client.public_data(session.access_token(), &query).await?;

        if show_area {
            print!("{}", render::area_table(session.started_at, &place, &area));
            println!();
        }
        display_public_data(&types, &body, output)?;
    }
    Ok(())
}

fn display_public_data(types: &[String], body: &str, output: Output) -> Result<()> {
    if output == Output::Raw {
        println!("{body}");
        return Ok(());
    }

    let stations = public::parse_public_data(types, body, Utc::now())?;
    if output == Output::Json {
        println!("{}", serde_json::to_string(&stations)?);
        return Ok(());
    }

    let aggregation = public::average(&public::search_values(types), &stations);
    if aggregation.is_empty() {
        println!("## Data was not returned from Netatmo. Please try again.");
    }
    print!("{}", render::average_table(&aggregation));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, error::ErrorKind};

    #[test]
    fn no_subcommand_means_stations() {
        let cli = Cli::try_parse_from(["netatmo"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.output(), Output::Table);
    }

    #[test]
    fn credential_flags_build_a_credential() {
        let cli = Cli::try_parse_from([
            "netatmo",
            "--clientid",
            "cid",
            "--clientsecret",
            "secret",
            "--email",
            "me@example.com",
            "--password",
            "pw",
        ])
        .unwrap();

        let credential = cli.credential().unwrap().expect("all four fields given");
        assert_eq!(credential.client_id, "cid");
        assert_eq!(credential.username, "me@example.com");
    }

    #[test]
    fn partial_credentials_do_not_prompt() {
        let argv = ["netatmo", "--clientid", "cid", "--password", "pw"];
        let cli = Cli::try_parse_from(argv).unwrap();
        assert!(cli.credential().unwrap().is_none());
    }

    #[test]
    fn key_alias_sets_google_api_key() {
        let cli = Cli::try_parse_from(["netatmo", "--key", "GKEY"]).unwrap();
        assert_eq!(cli.google_api_key.as_deref(), Some("GKEY"));
    }

    #[test]
    fn getmeasure_alias_and_defaults() {
        let cli = Cli::try_parse_from([
            "netatmo",
            "m",
            "--di",
            "70:ee:50:00:00:01",
            "-b",
            "2018-01-23T12:00:00+09:00",
            "-e",
            "2018-01-23T13:00:00+09:00",
        ])
        .unwrap();

        let Some(Command::GetMeasure(args)) = cli.command else {
            panic!("expected getmeasure");
        };
        assert_eq!(args.scale, "max");
        assert_eq!(args.types, "Temperature,Humidity");
        assert_eq!(args.limit, 1024);

        let query = measure_query(&args).unwrap();
        assert_eq!(query.date_begin, 1_516_676_400);
        assert_eq!(query.date_end, 1_516_680_000);
        assert!(!query.real_time());
    }

    #[test]
    fn invalid_date_is_reported() {
        let err = parse_timestamp("yesterday", "--datebegin").unwrap_err();
        assert!(err.to_string().contains("--datebegin"));
    }

    #[test]
    fn getpublicdata_with_negative_center() {
        let cli = Cli::try_parse_from([
            "netatmo",
            "p",
            "--lat",
            "-33.8688",
            "--lon",
            "151.2093",
            "-r",
            "50",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.output(), Output::Json);
        let Some(Command::GetPublicData(args)) = cli.command else {
            panic!("expected getpublicdata");
        };
        assert_eq!(args.latitude, Some(-33.8688));
        assert_eq!(args.longitude, Some(151.2093));
        assert_eq!(args.range, 50.0);
        assert_eq!(args.types, DEFAULT_TYPES);
        assert_eq!(args.language, "en");
    }

    #[test]
    fn half_specified_center_is_rejected() {
        let half_centers = [["p", "--lat", "35.68"], ["p", "--lon", "139.76"]];

        for args in half_centers {
            let argv = std::iter::once("netatmo").chain(args);
            let err = Cli::try_parse_from(argv).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn config_dir_reads_env_override() {
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "config_dir")
            .unwrap();

        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(CONFIG_DIR_ENV)));
        assert_eq!(CONFIG_DIR_ENV, "NETATMO_CFG_PATH");
    }

    #[test]
    fn write_confirmation_names_file_and_dir() {
        let dir = PathBuf::from("/tmp/netatmo");
        let store = CredentialStore::resolve(Some(dir)).unwrap();
        assert_eq!(updated_message(&store), "Updated 'netatmo.cfg' at /tmp/netatmo.");
    }

    #[test]
    fn raw_wins_over_json() {
        let cli = Cli::try_parse_from(["netatmo", "--raw", "--json"]).unwrap();
        assert_eq!(cli.output(), Output::Raw);
    }
}
