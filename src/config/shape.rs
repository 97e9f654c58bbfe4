use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Token {
    pub ttl: Option<i64>,
    pub leeway: Option<i64>,
    pub signing_key: Option<String>,
    pub algorithm: Option<String>,
    pub cache_capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Password {
    pub mem_cost: Option<u32>,
    pub time_cost: Option<u32>,
    pub lanes: Option<u32>,
    pub hash_length: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Sec {
    pub token: Option<Token>,
    pub password: Option<Password>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    #[serde(rename = "type")]
    pub kind: Option<StorageKind>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Db {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Jobs {
    pub token_sweep: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub master_key: Option<String>,

    pub sec: Option<Sec>,
    pub storage: Option<Storage>,
    pub db: Option<Db>,
    pub jobs: Option<Jobs>,
}
