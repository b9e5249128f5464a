//! Shared fixtures for integration tests
//!
//! Writes synthetic registry extracts the way the registry ships them:
//! headerless, `;`-separated, every field quoted and Windows-1252 encoded.

#![allow(dead_code)]

use cnpj_delta::adapters::sink::ShardSink;
use cnpj_delta::config::{DeltaConfig, LoggingConfig};
use cnpj_delta::core::export::ExportCoordinator;
use cnpj_delta::core::ingest::{IngestSummary, StoreBuilder};
use cnpj_delta::domain::{Cnpj, Result};
use encoding_rs::WINDOWS_1252;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

pub const PERIOD: &str = "2025-03";

/// Two establishments of one entity in partition `11`
pub const HEAD_OFFICE: &str = "11222333000181";
pub const BRANCH: &str = "11222333000262";
/// One establishment in partition `22`
pub const OTHER: &str = "22333444000110";

pub fn cnpj(id: &str) -> Cnpj {
    Cnpj::new(id).unwrap()
}

fn line(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| format!("\"{f}\"")).collect();
    quoted.join(";")
}

/// Characters `from..to` of an id, so fixtures may carry non-ASCII ids
fn id_part(id: &str, from: usize, to: usize) -> String {
    id.chars().skip(from).take(to.saturating_sub(from)).collect()
}

/// One establishment row, keyed by its 14-character id
#[derive(Debug, Clone)]
pub struct EstablishmentFixture {
    pub cnpj: String,
    pub head_office: &'static str,
    pub trade_name: String,
    pub status: &'static str,
    pub street: String,
}

impl EstablishmentFixture {
    pub fn new(cnpj: &str, trade_name: &str) -> Self {
        Self {
            cnpj: cnpj.to_string(),
            head_office: if id_part(cnpj, 8, 12) == "0001" { "1" } else { "2" },
            trade_name: trade_name.to_string(),
            status: "02",
            street: "DAS FLORES".to_string(),
        }
    }

    fn to_line(&self) -> String {
        let root = id_part(&self.cnpj, 0, 8);
        let order = id_part(&self.cnpj, 8, 12);
        let dv = id_part(&self.cnpj, 12, usize::MAX);
        line(&[
            &root,
            &order,
            &dv,
            self.head_office,
            &self.trade_name,
            self.status,
            "20200115",
            "00",
            "",
            "",
            "20050103",
            "6201501",
            "6202300,6209100",
            "RUA",
            &self.street,
            "100",
            "SALA  2",
            "CENTRO",
            "01001000",
            "SP",
            "7107",
            "11",
            "55551234",
            "",
            "",
            "",
            "",
            "contato@example.com",
            "",
            "",
        ])
    }
}

/// Builder for a complete set of raw extracts
#[derive(Debug, Clone)]
pub struct RawExtracts {
    pub companies: Vec<String>,
    pub establishments: Vec<EstablishmentFixture>,
    pub partners: Vec<String>,
    pub tax_regimes: Vec<String>,
    pub extra_establishment_lines: Vec<String>,
    pub omitted: Vec<&'static str>,
}

impl RawExtracts {
    /// Three establishments in two partitions
    pub fn sample() -> Self {
        Self {
            companies: vec![
                line(&["11222333", "CAFÉ DO PORTO LTDA", "2062", "49", "150000,00", "01", ""]),
                line(&["22333444", "AÇÚCAR E AFINS S.A.", "2062", "49", "1.250.000,50", "05", ""]),
            ],
            establishments: vec![
                EstablishmentFixture::new(HEAD_OFFICE, "CAFE DO PORTO"),
                EstablishmentFixture::new(BRANCH, "CAFE DO PORTO FILIAL"),
                EstablishmentFixture::new(OTHER, "DOCE LAR"),
            ],
            partners: vec![line(&[
                "11222333",
                "2",
                "JOSÉ DA SILVA",
                "***123456**",
                "49",
                "20050103",
                "",
                "***000000**",
                "",
                "00",
                "4",
            ])],
            tax_regimes: vec![line(&["11222333", "S", "20070701", "00000000", "N", "", ""])],
            extra_establishment_lines: Vec::new(),
            omitted: Vec::new(),
        }
    }

    pub fn establishment_mut(&mut self, id: &str) -> &mut EstablishmentFixture {
        self.establishments
            .iter_mut()
            .find(|e| e.cnpj == id)
            .unwrap()
    }

    pub fn without_establishment(mut self, id: &str) -> Self {
        self.establishments.retain(|e| e.cnpj != id);
        self
    }

    pub fn with_establishment(mut self, establishment: EstablishmentFixture) -> Self {
        self.establishments.push(establishment);
        self
    }

    pub fn with_malformed_establishment(mut self) -> Self {
        self.extra_establishment_lines
            .push(line(&["11999888", "0001", "55", "1", "TOO SHORT"]));
        self
    }

    /// Leaves out the file whose name carries `marker`
    pub fn omit(mut self, marker: &'static str) -> Self {
        self.omitted.push(marker);
        self
    }

    fn files(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut establishments: Vec<String> =
            self.establishments.iter().map(|e| e.to_line()).collect();
        establishments.extend(self.extra_establishment_lines.iter().cloned());

        vec![
            ("K3241.K03200Y0.D50308.EMPRECSV", self.companies.clone()),
            ("K3241.K03200Y0.D50308.ESTABELE", establishments),
            ("K3241.K03200Y0.D50308.SOCIOCSV", self.partners.clone()),
            ("F.K03200$W.SIMPLES.CSV.D50308", self.tax_regimes.clone()),
            (
                "F.K03200$Z.D50308.CNAECSV",
                vec![
                    line(&["6201501", "Desenvolvimento de programas de computador sob encomenda"]),
                    line(&["6202300", "Desenvolvimento e licenciamento de programas customizáveis"]),
                    line(&["6209100", "Suporte técnico, manutenção e outros serviços"]),
                ],
            ),
            (
                "F.K03200$Z.D50308.MUNICCSV",
                vec![line(&["7107", "SAO PAULO"])],
            ),
            (
                "F.K03200$Z.D50308.NATJUCSV",
                vec![line(&["2062", "Sociedade Empresária Limitada"])],
            ),
            (
                "F.K03200$Z.D50308.PAISCSV",
                vec![line(&["105", "BRASIL"])],
            ),
            (
                "F.K03200$Z.D50308.QUALSCSV",
                vec![
                    line(&["00", "Não informada"]),
                    line(&["49", "Sócio-Administrador"]),
                ],
            ),
            (
                "F.K03200$Z.D50308.MOTICSV",
                vec![line(&["00", "SEM MOTIVO"]), line(&["01", "EXTINCAO POR ENCERRAMENTO"])],
            ),
        ]
    }

    /// Replaces the contents of `dir` with the extract files
    pub fn write(&self, dir: &Path) {
        if dir.exists() {
            std::fs::remove_dir_all(dir).unwrap();
        }
        std::fs::create_dir_all(dir).unwrap();

        for (name, lines) in self.files() {
            if self.omitted.iter().any(|m| name.contains(m)) {
                continue;
            }
            let mut text = lines.join("\n");
            text.push('\n');
            let (bytes, _, unmappable) = WINDOWS_1252.encode(&text);
            assert!(!unmappable, "fixture text not representable in Windows-1252");
            std::fs::write(dir.join(name), bytes).unwrap();
        }
    }
}

/// Temporary workspace with a configuration pointing into it
pub struct TestEnv {
    pub dir: TempDir,
    pub config: DeltaConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = DeltaConfig::default();
        config.paths.raw_dir = dir.path().join("raw");
        config.paths.store_dir = dir.path().join("store");
        config.paths.cache_dir = dir.path().join("cache");
        config.paths.output_dir = dir.path().join("output");
        config.paths.archive_dir = dir.path().join("archive");
        config.export.period = Some(PERIOD.to_string());
        config.export.workers = 2;
        config.export.page_size = 2;
        config.export.max_retries = 0;
        config.export.retry_backoff_ms = vec![1];
        config.verification.enable_verification = false;
        config.verification.seed = Some(7);
        config.logging = LoggingConfig::console_only();
        Self { dir, config }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.config.paths.raw_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.paths.output_dir.clone()
    }

    /// Writes the extracts and builds the store
    pub async fn ingest(&self, extracts: &RawExtracts) -> Result<IngestSummary> {
        extracts.write(&self.raw_dir());
        StoreBuilder::new(&self.config).build().await
    }

    pub fn coordinator(&self) -> ExportCoordinator {
        let (_tx, rx) = watch::channel(false);
        ExportCoordinator::new(self.config.clone(), rx).unwrap()
    }

    pub fn coordinator_with_sink(&self, sink: Arc<dyn ShardSink>) -> ExportCoordinator {
        let (_tx, rx) = watch::channel(false);
        ExportCoordinator::with_sink(self.config.clone(), sink, rx).unwrap()
    }

    /// Every file under the output directory, keyed by relative path
    pub fn published_files(&self) -> BTreeMap<String, Vec<u8>> {
        published_files(&self.output_dir())
    }
}

pub fn published_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

/// Parsed documents of one published shard
pub fn shard_documents(root: &Path, key: &str) -> Vec<serde_json::Value> {
    let text = std::fs::read_to_string(root.join(format!("{key}.ndjson"))).unwrap();
    text.lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

pub fn shard_manifest(root: &Path, key: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(root.join(format!("{key}.manifest.json"))).unwrap();
    serde_json::from_str(&text).unwrap()
}
