//! One partition of the structured store
//!
//! During a build, raw rows are staged into `stage_*` tables of the partition
//! file and then joined into `entity_records`. Staging tables are dropped once
//! materialization succeeds, leaving one denormalized row per establishment.

use crate::core::ingest::parse::{CompanyRow, EstablishmentRow, PartnerRow, TaxRegimeRow};
use crate::core::ingest::reference::ReferenceTables;
use crate::domain::{Cnpj, DeltaError, EntityRecord, PartitionKey, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Statement};
use std::path::Path;

const BUILD_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS stage_companies (
        root TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stage_tax_regimes (
        root TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stage_partners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        root TEXT NOT NULL,
        payload TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_stage_partners_root ON stage_partners (root);
    CREATE TABLE IF NOT EXISTS stage_establishments (
        cnpj TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS entity_records (
        cnpj TEXT PRIMARY KEY,
        root TEXT NOT NULL,
        has_partners INTEGER NOT NULL,
        has_tax_regime INTEGER NOT NULL,
        record TEXT NOT NULL
    );
";

const DROP_STAGING: &str = "
    DROP TABLE IF EXISTS stage_companies;
    DROP TABLE IF EXISTS stage_tax_regimes;
    DROP TABLE IF EXISTS stage_partners;
    DROP TABLE IF EXISTS stage_establishments;
";

pub(crate) fn store_err(err: rusqlite::Error) -> DeltaError {
    DeltaError::Store(err.to_string())
}

/// The build directory is discarded on failure, so durability is not needed here.
fn open_for_build(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(store_err)?;
    conn.execute_batch(
        "PRAGMA journal_mode=OFF;
         PRAGMA synchronous=OFF;
         PRAGMA temp_store=MEMORY;",
    )
    .map_err(store_err)?;
    conn.execute_batch(BUILD_SCHEMA).map_err(store_err)?;
    Ok(conn)
}

/// Buffered writer for the staging tables of one partition
pub struct PartitionWriter {
    conn: Connection,
    pending: usize,
    commit_interval: usize,
    staged: u64,
}

impl PartitionWriter {
    pub fn create(path: &Path, commit_interval: usize) -> Result<Self> {
        let conn = open_for_build(path)?;
        conn.execute_batch("BEGIN").map_err(store_err)?;
        Ok(Self {
            conn,
            pending: 0,
            commit_interval: commit_interval.max(1),
            staged: 0,
        })
    }

    pub fn stage_company(&mut self, row: &CompanyRow) -> Result<()> {
        let payload = serde_json::to_string(row)?;
        self.conn
            .prepare_cached("INSERT OR REPLACE INTO stage_companies (root, payload) VALUES (?1, ?2)")
            .and_then(|mut stmt| stmt.execute(params![row.root.as_str(), payload]))
            .map_err(store_err)?;
        self.after_insert()
    }

    pub fn stage_tax_regime(&mut self, row: &TaxRegimeRow) -> Result<()> {
        let payload = serde_json::to_string(row)?;
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO stage_tax_regimes (root, payload) VALUES (?1, ?2)",
            )
            .and_then(|mut stmt| stmt.execute(params![row.root.as_str(), payload]))
            .map_err(store_err)?;
        self.after_insert()
    }

    pub fn stage_partner(&mut self, row: &PartnerRow) -> Result<()> {
        let payload = serde_json::to_string(row)?;
        self.conn
            .prepare_cached("INSERT INTO stage_partners (root, payload) VALUES (?1, ?2)")
            .and_then(|mut stmt| stmt.execute(params![row.root.as_str(), payload]))
            .map_err(store_err)?;
        self.after_insert()
    }

    pub fn stage_establishment(&mut self, row: &EstablishmentRow) -> Result<()> {
        let payload = serde_json::to_string(row)?;
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO stage_establishments (cnpj, payload) VALUES (?1, ?2)",
            )
            .and_then(|mut stmt| stmt.execute(params![row.cnpj.as_str(), payload]))
            .map_err(store_err)?;
        self.after_insert()
    }

    fn after_insert(&mut self) -> Result<()> {
        self.pending += 1;
        self.staged += 1;
        if self.pending >= self.commit_interval {
            self.conn
                .execute_batch("COMMIT; BEGIN")
                .map_err(store_err)?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Commits outstanding rows and closes the connection
    pub fn finish(self) -> Result<u64> {
        self.conn.execute_batch("COMMIT").map_err(store_err)?;
        Ok(self.staged)
    }
}

/// Counts produced by materializing one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub records: u64,
    pub orphans: u64,
}

/// Rows shared by every establishment of one root
struct RootRows {
    root: String,
    company: Option<CompanyRow>,
    tax_regime: Option<TaxRegimeRow>,
    partners: Vec<PartnerRow>,
}

impl RootRows {
    fn load(
        root: &str,
        company_q: &mut Statement<'_>,
        regime_q: &mut Statement<'_>,
        partners_q: &mut Statement<'_>,
    ) -> Result<Self> {
        let company = company_q
            .query_row([root], |row| row.get::<_, String>(0))
            .optional()
            .map_err(store_err)?
            .map(|payload| serde_json::from_str::<CompanyRow>(&payload))
            .transpose()?;

        let tax_regime = regime_q
            .query_row([root], |row| row.get::<_, String>(0))
            .optional()
            .map_err(store_err)?
            .map(|payload| serde_json::from_str::<TaxRegimeRow>(&payload))
            .transpose()?;

        let payloads = partners_q
            .query_map([root], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(store_err)?;
        let partners = payloads
            .iter()
            .map(|payload| serde_json::from_str::<PartnerRow>(payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.to_string(),
            company,
            tax_regime,
            partners,
        })
    }
}

/// Joins the staged rows of a partition into `entity_records`, then drops staging
pub fn materialize(path: &Path, refs: &ReferenceTables) -> Result<MaterializeOutcome> {
    let conn = open_for_build(path)?;
    let mut outcome = MaterializeOutcome::default();

    let tx = conn.unchecked_transaction().map_err(store_err)?;
    {
        let mut establishments = conn
            .prepare("SELECT payload FROM stage_establishments ORDER BY cnpj")
            .map_err(store_err)?;
        let mut company_q = conn
            .prepare("SELECT payload FROM stage_companies WHERE root = ?1")
            .map_err(store_err)?;
        let mut regime_q = conn
            .prepare("SELECT payload FROM stage_tax_regimes WHERE root = ?1")
            .map_err(store_err)?;
        let mut partners_q = conn
            .prepare("SELECT payload FROM stage_partners WHERE root = ?1 ORDER BY id")
            .map_err(store_err)?;
        let mut insert = conn
            .prepare(
                "INSERT INTO entity_records (cnpj, root, has_partners, has_tax_regime, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(store_err)?;

        let mut current: Option<RootRows> = None;
        let mut rows = establishments.query([]).map_err(store_err)?;
        while let Some(row) = rows.next().map_err(store_err)? {
            let payload: String = row.get(0).map_err(store_err)?;
            let establishment: EstablishmentRow = serde_json::from_str(&payload)?;
            let root = establishment.cnpj.root().to_string();

            // Establishments arrive sorted by identifier, so each root's rows load once
            if current.as_ref().map_or(true, |c| c.root != root) {
                current = Some(RootRows::load(
                    &root,
                    &mut company_q,
                    &mut regime_q,
                    &mut partners_q,
                )?);
            }
            let Some(shared) = current.as_ref() else {
                continue;
            };

            let record = refs.denormalize(
                establishment,
                shared.company.as_ref(),
                shared.tax_regime.as_ref(),
                &shared.partners,
            );
            if record.company.is_none() {
                outcome.orphans += 1;
            }

            let json = serde_json::to_string(&record)?;
            insert
                .execute(params![
                    record.cnpj.as_str(),
                    root,
                    record.has_partners(),
                    record.has_tax_regime(),
                    json
                ])
                .map_err(store_err)?;
            outcome.records += 1;
        }
    }
    tx.commit().map_err(store_err)?;

    conn.execute_batch(DROP_STAGING).map_err(store_err)?;
    conn.execute_batch("VACUUM").map_err(store_err)?;

    Ok(outcome)
}

/// Which optional data a sampled record must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Partners,
    TaxRegime,
}

impl Coverage {
    fn predicate(&self) -> &'static str {
        match self {
            Self::Partners => "has_partners = 1",
            Self::TaxRegime => "has_tax_regime = 1",
        }
    }
}

/// Read-only access to the materialized records of one partition
pub struct PartitionReader {
    conn: Connection,
    key: PartitionKey,
}

impl PartitionReader {
    pub fn open(path: &Path, key: PartitionKey) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DeltaError::Store(format!("Cannot open partition {key}: {e}")))?;
        Ok(Self { conn, key })
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    /// Up to `limit` records with identifiers strictly after `after`, in identifier order
    pub fn read_page(&self, after: Option<&Cnpj>, limit: usize) -> Result<Vec<EntityRecord>> {
        let after = after.map(Cnpj::as_str).unwrap_or("");
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT record FROM entity_records WHERE cnpj > ?1 ORDER BY cnpj LIMIT ?2",
            )
            .map_err(store_err)?;
        let payloads = stmt
            .query_map(params![after, limit as i64], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(store_err)?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(DeltaError::from))
            .collect()
    }

    pub fn get(&self, cnpj: &Cnpj) -> Result<Option<EntityRecord>> {
        let payload = self
            .conn
            .query_row(
                "SELECT record FROM entity_records WHERE cnpj = ?1",
                [cnpj.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(store_err)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(DeltaError::from))
            .transpose()
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entity_records", [], |row| row.get(0))
            .map_err(store_err)?;
        Ok(count as u64)
    }

    /// Identifier at `offset` in identifier order
    pub fn id_at(&self, offset: u64) -> Result<Option<Cnpj>> {
        let id = self
            .conn
            .query_row(
                "SELECT cnpj FROM entity_records ORDER BY cnpj LIMIT 1 OFFSET ?1",
                [offset as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(store_err)?;
        id.map(|s| Cnpj::new(s).map_err(DeltaError::Store)).transpose()
    }

    /// Number of records carrying the requested data
    pub fn count_with(&self, coverage: Coverage) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM entity_records WHERE {}", coverage.predicate()),
                [],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(count as u64)
    }

    /// Identifier at `offset` among the records carrying the requested data
    pub fn id_with_at(&self, coverage: Coverage, offset: u64) -> Result<Option<Cnpj>> {
        let id = self
            .conn
            .query_row(
                &format!(
                    "SELECT cnpj FROM entity_records WHERE {} ORDER BY cnpj LIMIT 1 OFFSET ?1",
                    coverage.predicate()
                ),
                [offset as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(store_err)?;
        id.map(|s| Cnpj::new(s).map_err(DeltaError::Store)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::source::SourceCategory;
    use crate::domain::CnpjRoot;
    use tempfile::TempDir;

    fn establishment(root: &str, order: &str, dv: &str) -> EstablishmentRow {
        let mut fields = vec![String::new(); 30];
        fields[0] = root.to_string();
        fields[1] = order.to_string();
        fields[2] = dv.to_string();
        fields[20] = "7107".to_string();
        EstablishmentRow::parse(&fields).unwrap()
    }

    fn company(root: &str, name: &str) -> CompanyRow {
        CompanyRow {
            root: CnpjRoot::new(root).unwrap(),
            legal_name: name.to_string(),
            legal_nature_code: "2062".to_string(),
            responsible_qualification_code: "49".to_string(),
            share_capital: None,
            size_code: "01".to_string(),
            federative_entity: String::new(),
        }
    }

    #[test]
    fn test_stage_materialize_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("11.db");

        let mut writer = PartitionWriter::create(&path, 2).unwrap();
        writer.stage_company(&company("11222333", "ACME LTDA")).unwrap();
        writer.stage_establishment(&establishment("11222333", "0001", "81")).unwrap();
        writer.stage_establishment(&establishment("11222333", "0002", "62")).unwrap();
        writer.stage_establishment(&establishment("11999888", "0001", "07")).unwrap();
        assert_eq!(writer.finish().unwrap(), 4);

        let mut refs = ReferenceTables::default();
        refs.insert(SourceCategory::Municipalities, "7107".into(), "SAO PAULO".into());

        let outcome = materialize(&path, &refs).unwrap();
        assert_eq!(outcome, MaterializeOutcome { records: 3, orphans: 1 });

        let reader = PartitionReader::open(&path, PartitionKey::new("11").unwrap()).unwrap();
        assert_eq!(reader.count().unwrap(), 3);

        let first_page = reader.read_page(None, 2).unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].cnpj.as_str(), "11222333000181");
        assert_eq!(
            first_page[0].establishment.municipality.description.as_deref(),
            Some("SAO PAULO")
        );

        let rest = reader.read_page(Some(&first_page[1].cnpj), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(rest[0].company.is_none());

        let id = Cnpj::new("11222333000262").unwrap();
        assert_eq!(reader.get(&id).unwrap().unwrap().cnpj, id);
        assert_eq!(reader.id_at(2).unwrap().unwrap().as_str(), "11999888000107");
        assert!(reader.id_at(3).unwrap().is_none());
        assert_eq!(reader.count_with(Coverage::Partners).unwrap(), 0);
        assert!(reader.id_with_at(Coverage::TaxRegime, 0).unwrap().is_none());
    }

    #[test]
    fn test_staging_tables_dropped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("22.db");
        let writer = PartitionWriter::create(&path, 10).unwrap();
        writer.finish().unwrap();
        materialize(&path, &ReferenceTables::default()).unwrap();

        let conn = Connection::open(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'stage_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
