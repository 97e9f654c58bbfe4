use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::default::Default;
use std::fmt::{Display, Formatter};

use clap::Parser;
use vibe_lib::sec::TOKENS_KEY_INFO;

use crate::error::{self, Context};
use crate::sec::authn::token::Algorithm;

mod shape;

pub type Kdf = hkdf::Hkdf<sha3::Sha3_512>;

/// smallest accepted output length of the password kdf in bytes
pub const MIN_HASH_LENGTH: u32 = 64;

#[derive(Debug, Parser)]
#[command(author, version ,about, long_about = None)]
pub struct CliArgs {
    /// a config file to load settings from. may be given multiple times
    #[arg(long)]
    config: Vec<PathBuf>
}

#[derive(Debug)]
pub struct Config {
    pub settings: Settings,
    pub kdf: Kdf,
}

impl Config {
    pub fn from_args(args: CliArgs) -> error::Result<Self> {
        let cwd = std::env::current_dir()
            .context("failed to retrieve cwd for Settings")?;
        let mut settings = Settings::default();

        for config_path in args.config {
            let full = if config_path.is_absolute() {
                config_path
            } else {
                cwd.join(config_path)
            };

            let full = full.canonicalize().context(format!(
                "config file not found: \"{}\"", full.display()
            ))?;

            tracing::debug!("loading config file \"{}\"", full.display());

            let loaded = Self::load_file(&full)?;
            let src = SrcFile::new(&full);
            let dot = DotPath::new(&"settings");

            settings.merge(&src, dot, loaded)?;
        }

        Ok(Self::from_settings(settings))
    }

    pub fn from_settings(settings: Settings) -> Self {
        let kdf = Kdf::new(None, settings.master_key.as_bytes());

        Config {
            settings,
            kdf
        }
    }

    /// the configured signing key or one derived from the master key
    pub fn signing_key(&self) -> error::Result<Vec<u8>> {
        if let Some(key) = &self.settings.sec.token.signing_key {
            return Ok(key.clone().into_bytes());
        }

        let mut derived = [0u8; 64];

        self.kdf.expand(TOKENS_KEY_INFO, &mut derived)?;

        Ok(derived.to_vec())
    }

    fn load_file(path: &Path) -> error::Result<shape::Settings> {
        let ext = path.extension().context(format!(
            "failed to retrieve the file extension for config file: \"{}\"", path.display()
        ))?;

        let ext = ext.to_ascii_lowercase();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .context(format!("failed to open config file: \"{}\"", path.display()))?;
        let reader = std::io::BufReader::new(file);

        if ext.eq("yaml") || ext.eq("yml") {
            serde_yaml::from_reader(reader).context(format!(
                "failed to parse yaml config file: \"{}\"", path.display()
            ))
        } else if ext.eq("json") {
            serde_json::from_reader(reader).context(format!(
                "failed to parse json config file: \"{}\"", path.display()
            ))
        } else {
            Err(error::Error::new()
                .kind(error::Kind::Config)
                .message(format!("unknown type of config file: \"{}\"", path.display())))
        }
    }
}

struct SrcFile<'a> {
    src: &'a Path,
}

impl<'a> SrcFile<'a> {
    fn new(src: &'a Path) -> Self {
        SrcFile {
            src
        }
    }
}

impl<'a> Display for SrcFile<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.src.display())
    }
}

struct DotPath<'a>(Vec<&'a dyn Display>);

impl<'a> DotPath<'a> {
    fn new(name: &'a (dyn Display)) -> Self {
        DotPath(vec![name])
    }

    fn push(&self, name: &'a (dyn Display)) -> Self {
        let mut path = self.0.clone();
        path.push(name);

        DotPath(path)
    }
}

impl<'a> Display for DotPath<'a> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;

        for name in &self.0 {
            if first {
                write!(fmt, "{name}")?;
                first = false;
            } else {
                write!(fmt, ".{name}")?;
            }
        }

        Ok(())
    }
}

fn invalid(dot: DotPath<'_>, src: &SrcFile<'_>, reason: &str) -> error::Error {
    error::Error::new()
        .kind(error::Kind::Config)
        .message(format!("{dot} {reason}. file: {src}"))
}

#[derive(Debug)]
pub struct Settings {
    pub master_key: String,
    pub sec: Sec,
    pub storage: Storage,
    pub db: Db,
    pub jobs: Jobs,
}

impl Settings {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, settings: shape::Settings) -> error::Result<()> {
        if let Some(master_key) = settings.master_key {
            if master_key.is_empty() {
                return Err(invalid(dot.push(&"master_key"), src, "cannot be empty"));
            }

            self.master_key = master_key;
        }

        if let Some(sec) = settings.sec {
            self.sec.merge(src, dot.push(&"sec"), sec)?;
        }

        if let Some(storage) = settings.storage {
            self.storage.merge(src, dot.push(&"storage"), storage)?;
        }

        if let Some(db) = settings.db {
            self.db.merge(src, dot.push(&"db"), db)?;
        }

        if let Some(jobs) = settings.jobs {
            self.jobs.merge(src, dot.push(&"jobs"), jobs)?;
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            master_key: "vibe_master_key_secret".into(),
            sec: Sec::default(),
            storage: Storage::default(),
            db: Db::default(),
            jobs: Jobs::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Sec {
    pub token: Token,
    pub password: Password,
}

impl Sec {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, sec: shape::Sec) -> error::Result<()> {
        if let Some(token) = sec.token {
            self.token.merge(src, dot.push(&"token"), token)?;
        }

        if let Some(password) = sec.password {
            self.password.merge(src, dot.push(&"password"), password)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct Token {
    pub ttl: chrono::Duration,
    pub leeway: chrono::Duration,
    pub signing_key: Option<String>,
    pub algorithm: Algorithm,
    pub cache_capacity: u64,
}

impl Token {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, token: shape::Token) -> error::Result<()> {
        if let Some(ttl) = token.ttl {
            if ttl <= 0 {
                return Err(invalid(dot.push(&"ttl"), src, "must be greater than 0"));
            }

            self.ttl = chrono::Duration::seconds(ttl);
        }

        if let Some(leeway) = token.leeway {
            if leeway < 0 {
                return Err(invalid(dot.push(&"leeway"), src, "cannot be negative"));
            }

            self.leeway = chrono::Duration::seconds(leeway);
        }

        if let Some(signing_key) = token.signing_key {
            if signing_key.is_empty() {
                return Err(invalid(dot.push(&"signing_key"), src, "cannot be empty"));
            }

            self.signing_key = Some(signing_key);
        }

        if let Some(algorithm) = token.algorithm {
            self.algorithm = match Algorithm::from_str(&algorithm) {
                Ok(valid) => valid,
                Err(_) => {
                    return Err(invalid(dot.push(&"algorithm"), src, "is not a supported signing algorithm"));
                }
            };
        }

        if let Some(cache_capacity) = token.cache_capacity {
            self.cache_capacity = cache_capacity;
        }

        Ok(())
    }
}

impl Default for Token {
    fn default() -> Self {
        Token {
            ttl: chrono::Duration::hours(1),
            leeway: chrono::Duration::minutes(1),
            signing_key: None,
            algorithm: Algorithm::HS256,
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug)]
pub struct Password {
    pub mem_cost: u32,
    pub time_cost: u32,
    pub lanes: u32,
    pub hash_length: u32,
}

impl Password {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, password: shape::Password) -> error::Result<()> {
        if let Some(mem_cost) = password.mem_cost {
            self.mem_cost = mem_cost;
        }

        if let Some(time_cost) = password.time_cost {
            if time_cost == 0 {
                return Err(invalid(dot.push(&"time_cost"), src, "must be greater than 0"));
            }

            self.time_cost = time_cost;
        }

        if let Some(lanes) = password.lanes {
            if lanes == 0 {
                return Err(invalid(dot.push(&"lanes"), src, "must be greater than 0"));
            }

            self.lanes = lanes;
        }

        if let Some(hash_length) = password.hash_length {
            if hash_length < MIN_HASH_LENGTH {
                return Err(invalid(dot.push(&"hash_length"), src, "must be at least 64 bytes"));
            }

            self.hash_length = hash_length;
        }

        if self.mem_cost < 8 * self.lanes {
            return Err(invalid(dot.push(&"mem_cost"), src, "must be at least 8 KiB per lane"));
        }

        Ok(())
    }
}

impl Default for Password {
    fn default() -> Self {
        Password {
            mem_cost: 19456,
            time_cost: 2,
            lanes: 1,
            hash_length: MIN_HASH_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Postgres,
}

#[derive(Debug)]
pub struct Storage {
    pub kind: StorageKind,
    pub timeout: std::time::Duration,
}

impl Storage {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, storage: shape::Storage) -> error::Result<()> {
        if let Some(kind) = storage.kind {
            self.kind = match kind {
                shape::StorageKind::Memory => StorageKind::Memory,
                shape::StorageKind::Postgres => StorageKind::Postgres,
            };
        }

        if let Some(timeout) = storage.timeout {
            if timeout == 0 {
                return Err(invalid(dot.push(&"timeout"), src, "must be greater than 0"));
            }

            self.timeout = std::time::Duration::from_secs(timeout);
        }

        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            kind: StorageKind::Memory,
            timeout: std::time::Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub struct Db {
    pub user: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String
}

impl Db {
    fn merge(&mut self, _src: &SrcFile<'_>, _dot: DotPath<'_>, db: shape::Db) -> error::Result<()> {
        if let Some(user) = db.user {
            self.user = user;
        }

        if let Some(password) = db.password {
            self.password = Some(password);
        }

        if let Some(host) = db.host {
            self.host = host;
        }

        if let Some(port) = db.port {
            self.port = port;
        }

        if let Some(dbname) = db.dbname {
            self.dbname = dbname;
        }

        Ok(())
    }
}

impl Default for Db {
    fn default() -> Self {
        Db {
            user: "postgres".into(),
            password: None,
            host: "localhost".into(),
            port: 5432,
            dbname: "vibe".into(),
        }
    }
}

#[derive(Debug)]
pub struct Jobs {
    pub token_sweep: String,
}

impl Jobs {
    fn merge(&mut self, src: &SrcFile<'_>, dot: DotPath<'_>, jobs: shape::Jobs) -> error::Result<()> {
        if let Some(token_sweep) = jobs.token_sweep {
            if cron::Schedule::from_str(&token_sweep).is_err() {
                return Err(invalid(dot.push(&"token_sweep"), src, "is not a valid cron expression"));
            }

            self.token_sweep = token_sweep;
        }

        Ok(())
    }
}

impl Default for Jobs {
    fn default() -> Self {
        Jobs {
            // sec min hour day_of_month month day_of_week year
            token_sweep: "0 * * * * * *".into(),
        }
    }
}
