//! Routine signature lookup and call rendering.
//!
//! Callers address parameters by name, but neither sqlx driver binds by name.
//! The declared parameter list is read from `information_schema` and used to
//! render a call statement whose placeholders line up with the caller's
//! values. Names and types in the rendered statement always come from the
//! catalog, quoted, never from the request.

use crate::error::{DbError, DbResult};
use crate::models::{RoutineParam, RoutineParams};
use sqlx::{MySqlConnection, PgConnection};

/// Whether a routine is called as a function or a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Function,
    Procedure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

impl ParamMode {
    fn parse(mode: Option<&str>) -> Self {
        match mode.map(str::to_ascii_uppercase).as_deref() {
            Some("OUT") => ParamMode::Out,
            Some("INOUT") => ParamMode::InOut,
            _ => ParamMode::In,
        }
    }

    /// Whether the caller supplies a value for this parameter.
    pub fn accepts_input(self) -> bool {
        matches!(self, ParamMode::In | ParamMode::InOut)
    }
}

/// A declared routine parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredParam {
    pub name: String,
    pub mode: ParamMode,
    /// Schema-qualified type, when the engine reports one usable in a cast.
    pub type_name: Option<(String, String)>,
}

/// Catalog description of one routine overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSignature {
    pub schema: String,
    pub name: String,
    pub kind: RoutineKind,
    pub parameters: Vec<DeclaredParam>,
    /// 1-based position of `schema` in the session search path, 0 when the
    /// schema is not on it.
    pub search_rank: i32,
}

impl RoutineSignature {
    fn find_input(&self, name: &str) -> Option<&DeclaredParam> {
        self.parameters
            .iter()
            .find(|p| p.mode.accepts_input() && p.name.eq_ignore_ascii_case(name))
    }

    fn accepts_all(&self, params: &RoutineParams) -> bool {
        params.names().all(|name| self.find_input(name).is_some())
    }
}

/// A rendered call: statement text plus values in placeholder order.
#[derive(Debug)]
pub struct RoutineCall<'p> {
    /// Single-placeholder statements run before `sql` on the same connection.
    pub setup: Vec<(String, &'p RoutineParam)>,
    pub sql: String,
    pub values: Vec<&'p RoutineParam>,
}

// =============================================================================
// Identifier validation
// =============================================================================

/// Split a routine name into optional schema and name, validating both.
///
/// Accepts `name` or `schema.name`, each part starting with a letter or
/// underscore and containing only ASCII alphanumerics and underscores.
pub fn split_routine_name(routine: &str) -> DbResult<(Option<&str>, &str)> {
    if routine.trim().is_empty() {
        return Err(DbError::invalid_input("Routine name must not be empty"));
    }

    let (schema, name) = match routine.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, routine),
    };

    for part in schema.into_iter().chain(std::iter::once(name)) {
        if !is_identifier(part) {
            return Err(DbError::invalid_input(format!(
                "Invalid routine name '{}'",
                routine
            )));
        }
    }
    Ok((schema, name))
}

/// Validate every parameter name.
pub fn validate_param_names(params: &RoutineParams) -> DbResult<()> {
    match params.names().find(|name| !is_identifier(name)) {
        Some(bad) => Err(DbError::invalid_input(format!(
            "Invalid parameter name '{}'",
            bad
        ))),
        None => Ok(()),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_pg(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_mysql(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// PostgreSQL
// =============================================================================

pub mod postgres {
    use super::*;
    use std::fmt::Write as _;

    const SIGNATURE_SQL: &str = r#"
        SELECT r.specific_name::text,
               r.routine_schema::text,
               r.routine_name::text,
               r.routine_type::text,
               p.parameter_name::text,
               p.parameter_mode::text,
               p.udt_schema::text,
               p.udt_name::text,
               COALESCE(array_position(current_schemas(false), r.routine_schema::name), 0)
        FROM information_schema.routines r
        LEFT JOIN information_schema.parameters p
          ON p.specific_schema = r.specific_schema
         AND p.specific_name = r.specific_name
        WHERE lower(r.routine_name) = lower($1)
          AND CASE WHEN $2::text IS NULL
                   THEN r.routine_schema::name = ANY(current_schemas(false))
                   ELSE lower(r.routine_schema) = lower($2)
              END
          AND r.routine_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY r.routine_schema, r.specific_name, p.ordinal_position
    "#;

    type SignatureRow = (
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i32,
    );

    /// Load every overload of `name` visible to the current user.
    ///
    /// An unqualified name only matches routines in schemas on the session
    /// search path, the same set Postgres itself would resolve against.
    pub async fn lookup(
        conn: &mut PgConnection,
        schema: Option<&str>,
        name: &str,
    ) -> DbResult<Vec<RoutineSignature>> {
        let rows: Vec<SignatureRow> = sqlx::query_as(SIGNATURE_SQL)
            .bind(name)
            .bind(schema)
            .fetch_all(conn)
            .await?;

        let mut signatures: Vec<(String, RoutineSignature)> = Vec::new();
        for (specific, r_schema, r_name, r_type, p_name, p_mode, t_schema, t_name, rank) in rows {
            if signatures.last().is_none_or(|(s, _)| *s != specific) {
                let kind = match r_type.as_deref() {
                    Some("PROCEDURE") => RoutineKind::Procedure,
                    _ => RoutineKind::Function,
                };
                signatures.push((
                    specific.clone(),
                    RoutineSignature {
                        schema: r_schema,
                        name: r_name,
                        kind,
                        parameters: Vec::new(),
                        search_rank: rank,
                    },
                ));
            }
            // Unnamed parameters cannot be addressed by name.
            if let (Some((_, sig)), Some(p_name)) = (signatures.last_mut(), p_name) {
                sig.parameters.push(DeclaredParam {
                    name: p_name,
                    mode: ParamMode::parse(p_mode.as_deref()),
                    type_name: t_schema.zip(t_name),
                });
            }
        }

        Ok(signatures.into_iter().map(|(_, sig)| sig).collect())
    }

    /// Pick the overload that declares every supplied name.
    ///
    /// Schemas earlier on the search path win, then the overload with the
    /// fewest parameters.
    pub fn select_overload(
        candidates: &[RoutineSignature],
        params: &RoutineParams,
    ) -> Option<RoutineSignature> {
        candidates
            .iter()
            .filter(|sig| sig.accepts_all(params))
            .min_by_key(|sig| (sig.search_rank, sig.parameters.len()))
            .cloned()
    }

    /// Render `SELECT * FROM f(name => $n::type, ...)` or `CALL p(...)`.
    ///
    /// Named notation lets omitted parameters fall back to their declared
    /// defaults. Each placeholder is cast to the declared type so text and
    /// NULL values resolve against the right overload.
    pub fn render<'p>(
        sig: &RoutineSignature,
        params: &'p RoutineParams,
    ) -> DbResult<RoutineCall<'p>> {
        let mut args = Vec::with_capacity(params.len());
        let mut values = Vec::with_capacity(params.len());

        for (name, value) in params.iter() {
            let declared = sig.find_input(name).ok_or_else(|| {
                DbError::invalid_input(format!(
                    "Routine {}.{} has no parameter '{}'",
                    sig.schema, sig.name, name
                ))
            })?;
            values.push(value);

            let mut arg = format!("{} => ${}", quote_pg(&declared.name), values.len());
            if let Some((type_schema, type_name)) = &declared.type_name {
                let _ = write!(arg, "::{}.{}", quote_pg(type_schema), quote_pg(type_name));
            }
            args.push(arg);
        }

        let target = format!(
            "{}.{}({})",
            quote_pg(&sig.schema),
            quote_pg(&sig.name),
            args.join(", ")
        );
        let sql = match sig.kind {
            RoutineKind::Function => format!("SELECT * FROM {}", target),
            RoutineKind::Procedure => format!("CALL {}", target),
        };
        Ok(RoutineCall {
            setup: Vec::new(),
            sql,
            values,
        })
    }
}

// =============================================================================
// MySQL
// =============================================================================

pub mod mysql {
    use super::*;

    static NULL_PARAM: RoutineParam = RoutineParam::Null;

    // CASTs keep information_schema columns decodable as text on MySQL 8.
    const SIGNATURE_SQL: &str = r#"
        SELECT CAST(r.ROUTINE_SCHEMA AS CHAR),
               CAST(r.ROUTINE_NAME AS CHAR),
               CAST(p.PARAMETER_NAME AS CHAR),
               CAST(p.PARAMETER_MODE AS CHAR)
        FROM information_schema.ROUTINES r
        LEFT JOIN information_schema.PARAMETERS p
          ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA
         AND p.SPECIFIC_NAME = r.SPECIFIC_NAME
         AND p.ORDINAL_POSITION > 0
        WHERE r.ROUTINE_SCHEMA = COALESCE(?, DATABASE())
          AND r.ROUTINE_NAME = ?
          AND r.ROUTINE_TYPE = 'PROCEDURE'
        ORDER BY p.ORDINAL_POSITION
    "#;

    type SignatureRow = (String, String, Option<String>, Option<String>);

    /// Load the procedure's declared parameters, or `None` if it does not exist.
    pub async fn lookup(
        conn: &mut MySqlConnection,
        schema: Option<&str>,
        name: &str,
    ) -> DbResult<Option<RoutineSignature>> {
        let rows: Vec<SignatureRow> = sqlx::query_as(SIGNATURE_SQL)
            .bind(schema)
            .bind(name)
            .fetch_all(conn)
            .await?;

        let mut signature: Option<RoutineSignature> = None;
        for (r_schema, r_name, p_name, p_mode) in rows {
            let sig = signature.get_or_insert_with(|| RoutineSignature {
                schema: r_schema,
                name: r_name,
                kind: RoutineKind::Procedure,
                parameters: Vec::new(),
                search_rank: 0,
            });
            if let Some(p_name) = p_name {
                sig.parameters.push(DeclaredParam {
                    name: p_name,
                    mode: ParamMode::parse(p_mode.as_deref()),
                    type_name: None,
                });
            }
        }
        Ok(signature)
    }

    /// Render `CALL p(?, ?, @out)` with one slot per declared parameter.
    ///
    /// Declared inputs the caller left out are bound as NULL. OUT and INOUT
    /// parameters go to session variables named after the parameter. Each
    /// INOUT variable is first set to the supplied value (or NULL) so nothing
    /// left on a pooled connection by an earlier call leaks in.
    pub fn render<'p>(
        sig: &RoutineSignature,
        params: &'p RoutineParams,
    ) -> DbResult<RoutineCall<'p>> {
        let is_input = |name: &str| {
            sig.parameters
                .iter()
                .any(|p| p.mode.accepts_input() && p.name.eq_ignore_ascii_case(name))
        };
        if let Some(unknown) = params.names().find(|name| !is_input(name)) {
            return Err(DbError::invalid_input(format!(
                "Procedure {}.{} has no parameter '{}'",
                sig.schema, sig.name, unknown
            )));
        }

        let mut setup = Vec::new();
        let mut slots = Vec::with_capacity(sig.parameters.len());
        let mut values = Vec::with_capacity(sig.parameters.len());
        for declared in &sig.parameters {
            let supplied = params
                .get_ignore_case(&declared.name)
                .unwrap_or(&NULL_PARAM);
            let variable = format!("@{}", quote_mysql(&declared.name));
            match declared.mode {
                ParamMode::In => {
                    values.push(supplied);
                    slots.push("?".to_string());
                }
                ParamMode::InOut => {
                    setup.push((format!("SET {} = ?", variable), supplied));
                    slots.push(variable);
                }
                ParamMode::Out => slots.push(variable),
            }
        }

        let sql = format!(
            "CALL {}.{}({})",
            quote_mysql(&sig.schema),
            quote_mysql(&sig.name),
            slots.join(", ")
        );
        Ok(RoutineCall { setup, sql, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, mode: ParamMode, ty: Option<&str>) -> DeclaredParam {
        DeclaredParam {
            name: name.to_string(),
            mode,
            type_name: ty.map(|t| ("pg_catalog".to_string(), t.to_string())),
        }
    }

    fn pg_bank_update() -> RoutineSignature {
        RoutineSignature {
            schema: "public".to_string(),
            name: "spbankupdate".to_string(),
            kind: RoutineKind::Function,
            parameters: vec![
                param("idaccount", ParamMode::In, Some("int8")),
                param("iduser", ParamMode::In, Some("int8")),
                param("idbank", ParamMode::In, Some("int8")),
                param("name", ParamMode::In, Some("varchar")),
            ],
            search_rank: 1,
        }
    }

    #[test]
    fn test_split_routine_name() {
        assert_eq!(split_routine_name("spBankGet").unwrap(), (None, "spBankGet"));
        assert_eq!(
            split_routine_name("dbo.spBankGet").unwrap(),
            (Some("dbo"), "spBankGet")
        );
    }

    #[test]
    fn test_split_routine_name_rejects_garbage() {
        for bad in ["", "  ", "sp;drop", "a.b.c", ".sp", "sp.", "1sp", "sp name"] {
            assert!(
                matches!(split_routine_name(bad), Err(DbError::InvalidInput { .. })),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_validate_param_names() {
        let ok = RoutineParams::new().with("idAccount", 1).with("_x9", 2);
        assert!(validate_param_names(&ok).is_ok());

        let bad = RoutineParams::new().with("id; --", 1);
        assert!(validate_param_names(&bad).is_err());
    }

    #[test]
    fn test_postgres_render_function() {
        let params = RoutineParams::new()
            .with("idAccount", 1)
            .with("idUser", 1)
            .with("name", "Banco");
        let call = postgres::render(&pg_bank_update(), &params).unwrap();
        assert_eq!(
            call.sql,
            "SELECT * FROM \"public\".\"spbankupdate\"(\
             \"idaccount\" => $1::\"pg_catalog\".\"int8\", \
             \"iduser\" => $2::\"pg_catalog\".\"int8\", \
             \"name\" => $3::\"pg_catalog\".\"varchar\")"
        );
        assert_eq!(call.values.len(), 3);
        assert_eq!(call.values[2], &RoutineParam::String("Banco".to_string()));
    }

    #[test]
    fn test_postgres_render_procedure_without_params() {
        let sig = RoutineSignature {
            schema: "app".to_string(),
            name: "refresh".to_string(),
            kind: RoutineKind::Procedure,
            parameters: vec![],
            search_rank: 1,
        };
        let params = RoutineParams::new();
        let call = postgres::render(&sig, &params).unwrap();
        assert_eq!(call.sql, "CALL \"app\".\"refresh\"()");
        assert!(call.values.is_empty());
    }

    #[test]
    fn test_postgres_render_rejects_unknown_name() {
        let params = RoutineParams::new().with("color", "red");
        let err = postgres::render(&pg_bank_update(), &params).unwrap_err();
        assert!(err.to_string().contains("color"));
    }

    #[test]
    fn test_postgres_select_overload() {
        let narrow = RoutineSignature {
            parameters: vec![param("idaccount", ParamMode::In, Some("int8"))],
            ..pg_bank_update()
        };
        let candidates = vec![pg_bank_update(), narrow.clone()];

        let only_account = RoutineParams::new().with("idAccount", 1);
        assert_eq!(
            postgres::select_overload(&candidates, &only_account),
            Some(narrow)
        );

        let with_name = RoutineParams::new().with("idAccount", 1).with("name", "x");
        assert_eq!(
            postgres::select_overload(&candidates, &with_name),
            Some(pg_bank_update())
        );

        let unknown = RoutineParams::new().with("nope", 1);
        assert_eq!(postgres::select_overload(&candidates, &unknown), None);
    }

    #[test]
    fn test_postgres_select_overload_prefers_search_path_order() {
        let shadow = RoutineSignature {
            schema: "reporting".to_string(),
            parameters: vec![param("idaccount", ParamMode::In, Some("int8"))],
            search_rank: 2,
            ..pg_bank_update()
        };
        let public = pg_bank_update();
        let candidates = vec![shadow, public.clone()];

        // The narrower overload lives later on the path, so it loses.
        let params = RoutineParams::new().with("idAccount", 1);
        assert_eq!(
            postgres::select_overload(&candidates, &params),
            Some(public)
        );
    }

    #[test]
    fn test_mysql_render_fills_missing_with_null() {
        let sig = RoutineSignature {
            schema: "cadastro_bancos".to_string(),
            name: "spBankCreate".to_string(),
            kind: RoutineKind::Procedure,
            parameters: vec![
                param("idAccount", ParamMode::In, None),
                param("idUser", ParamMode::In, None),
                param("name", ParamMode::In, None),
                param("newId", ParamMode::Out, None),
            ],
            search_rank: 0,
        };
        let params = RoutineParams::new().with("IDACCOUNT", 1).with("name", "Banco");
        let call = mysql::render(&sig, &params).unwrap();

        assert_eq!(
            call.sql,
            "CALL `cadastro_bancos`.`spBankCreate`(?, ?, ?, @`newId`)"
        );
        assert_eq!(
            call.values,
            vec![
                &RoutineParam::Int(1),
                &RoutineParam::Null,
                &RoutineParam::String("Banco".to_string()),
            ]
        );
        assert!(call.setup.is_empty());
    }

    #[test]
    fn test_mysql_render_inout_sets_variable_first() {
        let sig = RoutineSignature {
            schema: "db".to_string(),
            name: "spCounter".to_string(),
            kind: RoutineKind::Procedure,
            parameters: vec![
                param("step", ParamMode::In, None),
                param("counter", ParamMode::InOut, None),
            ],
            search_rank: 0,
        };

        let params = RoutineParams::new().with("step", 1).with("Counter", 41);
        let call = mysql::render(&sig, &params).unwrap();
        assert_eq!(call.sql, "CALL `db`.`spCounter`(?, @`counter`)");
        assert_eq!(call.values, vec![&RoutineParam::Int(1)]);
        assert_eq!(
            call.setup,
            vec![("SET @`counter` = ?".to_string(), &RoutineParam::Int(41))]
        );

        // Not supplied: the variable is reset rather than left as is.
        let params = RoutineParams::new().with("step", 1);
        let call = mysql::render(&sig, &params).unwrap();
        assert_eq!(
            call.setup,
            vec![("SET @`counter` = ?".to_string(), &RoutineParam::Null)]
        );
    }

    #[test]
    fn test_mysql_render_rejects_out_param_value() {
        let sig = RoutineSignature {
            schema: "db".to_string(),
            name: "sp".to_string(),
            kind: RoutineKind::Procedure,
            parameters: vec![param("result", ParamMode::Out, None)],
            search_rank: 0,
        };
        let params = RoutineParams::new().with("result", 1);
        assert!(mysql::render(&sig, &params).is_err());
    }

    #[test]
    fn test_param_mode_parse() {
        assert_eq!(ParamMode::parse(Some("IN")), ParamMode::In);
        assert_eq!(ParamMode::parse(Some("out")), ParamMode::Out);
        assert_eq!(ParamMode::parse(Some("INOUT")), ParamMode::InOut);
        assert_eq!(ParamMode::parse(None), ParamMode::In);
    }
}
