use tracing::debug;

use super::Store;
use crate::error::Result;

pub const AUDIT_DDL: &str = "
CREATE SEQUENCE IF NOT EXISTS etl_run_id_seq;
CREATE SEQUENCE IF NOT EXISTS etl_table_log_id_seq;

CREATE TABLE IF NOT EXISTS etl_run (
    id BIGINT PRIMARY KEY DEFAULT nextval('etl_run_id_seq'),
    operation_kind VARCHAR NOT NULL,
    year INTEGER,
    status VARCHAR NOT NULL,
    metadata VARCHAR,
    started_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP,
    error VARCHAR
);

CREATE TABLE IF NOT EXISTS etl_table_log (
    id BIGINT PRIMARY KEY DEFAULT nextval('etl_table_log_id_seq'),
    run_id BIGINT NOT NULL,
    table_name VARCHAR NOT NULL,
    source_table VARCHAR,
    operation_kind VARCHAR NOT NULL,
    status VARCHAR NOT NULL,
    rows_affected BIGINT,
    started_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP,
    error VARCHAR
);
";

pub const MODEL_DDL: &str = "
CREATE TABLE IF NOT EXISTS institution (
    unitid BIGINT PRIMARY KEY,
    name VARCHAR,
    city VARCHAR,
    state VARCHAR,
    zip VARCHAR,
    latitude DOUBLE,
    longitude DOUBLE,
    sector INTEGER,
    control INTEGER,
    level INTEGER,
    hbcu INTEGER,
    tribal INTEGER,
    updated_at TIMESTAMP
);

CREATE TABLE IF NOT EXISTS institution_year (
    unitid BIGINT NOT NULL,
    year INTEGER NOT NULL,
    PRIMARY KEY (unitid, year)
);

CREATE TABLE IF NOT EXISTS survey_fact (
    survey VARCHAR NOT NULL,
    unitid BIGINT NOT NULL,
    year INTEGER NOT NULL,
    scope VARCHAR NOT NULL,
    category VARCHAR NOT NULL,
    subgroup VARCHAR NOT NULL,
    metric VARCHAR NOT NULL,
    value DOUBLE,
    PRIMARY KEY (survey, unitid, year, scope, category, subgroup, metric)
);

CREATE TABLE IF NOT EXISTS ref_cip (
    code VARCHAR PRIMARY KEY,
    code_display VARCHAR,
    family VARCHAR,
    level INTEGER,
    title VARCHAR,
    definition VARCHAR,
    cross_references VARCHAR,
    examples VARCHAR,
    action VARCHAR
);
";

/// Create the audit and model tables if missing.
pub fn init_schema<S: Store + ?Sized>(store: &S) -> Result<()> {
    store.execute_batch(AUDIT_DDL)?;
    store.execute_batch(MODEL_DDL)?;
    debug!("schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DuckStore;

    #[test]
    fn schema_is_reentrant() -> anyhow::Result<()> {
        let store = DuckStore::open_in_memory()?;
        init_schema(&store)?;
        init_schema(&store)?;
        for t in ["etl_run", "etl_table_log", "institution", "institution_year", "survey_fact", "ref_cip"] {
            assert!(store.table_exists(t)?, "{t}");
        }
        Ok(())
    }
}
