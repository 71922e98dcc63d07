/*!
# MADI

Módulo de Análisis de Datos Institucionales: a small web application for
browsing university enrollment records in Colombia.

## Overview

Administrators upload the enrollment workbooks published for Colombian higher
education institutions. Each file is normalized to a canonical schema and the
accepted files are consolidated into one table. Users then pick a year,
institution, program and semester and get the matching rows together with the
summed headcount.

## Architecture

### Ingestion
- **loader**: reads `.xlsx`/`.xls`/`.ods` workbooks (first sheet) and `.csv`
  files into raw tables
- **normalize**: matches headers against the required columns, projects and
  renames them, consolidates batches and reports per-file warnings

### Query
- **query**: selector options, conjunctive equality filter and headcount sum
- **downloader**: CSV and XLSX export of query results

### State
- **store**: storage traits and the in-memory store
- **database**: SQLite store with the `users` and `enrollment` tables
- **login**: roles, registration, login and the default administrator
- **session**: browser sessions and their registry
- **workspace**: the application-state object every action goes through

### Web (`web` feature)
- **app**: axum router, handlers and HTML rendering

## Required columns

| Workbook header                            | Field         |
|--------------------------------------------|---------------|
| `AÑO`                                      | `year`        |
| `INSTITUCIÓN DE EDUCACIÓN SUPERIOR (IES)`  | `institution` |
| `PROGRAMA ACADÉMICO`                       | `program`     |
| `SEMESTRE`                                 | `semester`    |
| `SEXO`                                     | `sex`         |
| `MATRICULADOS`                             | `enrolled`    |

Headers are matched after trimming and uppercasing.
*/

#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod database;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod login;
pub mod normalize;
pub mod query;
pub mod schema;
pub mod session;
pub mod store;
pub mod workspace;

pub use config::Config;
pub use error::{MadiError, Result};
pub use workspace::Workspace;
