//! The course domain: users, courses, lessons, enrollments, reviews, quizzes, questions, answers.
//!
//! Declared as [`FullConfig`] so DDL, the runtime model and request validation all come from one place.
//! Every foreign key cascades on delete; every child row is owned by exactly one parent row.

use crate::config::*;
use std::collections::HashMap;

pub const USER_ROLES: &[&str] = &["student", "instructor", "admin"];
pub const COURSE_LEVELS: &[&str] = &["beginner", "intermediate", "advanced"];
pub const QUESTION_TYPES: &[&str] = &["multiple-choice", "true-false"];

const CRUD: &[&str] = &["create", "read", "update", "delete"];

/// Column declaration used while building the schema.
#[derive(Clone)]
struct Col {
    ty: ColumnTypeConfig,
    nullable: bool,
    default: Option<ColumnDefaultConfig>,
    rule: ValidationRule,
    read_only: bool,
    unique: bool,
    non_negative: bool,
}

impl Col {
    fn new(ty: ColumnTypeConfig) -> Self {
        Col {
            ty,
            nullable: false,
            default: None,
            rule: ValidationRule {
                required: Some(true),
                ..Default::default()
            },
            read_only: false,
            unique: false,
            non_negative: false,
        }
    }

    fn simple(name: &str) -> Self {
        Col::new(ColumnTypeConfig::Simple(name.into()))
    }

    fn with_params(name: &str, params: &[u32]) -> Self {
        Col::new(ColumnTypeConfig::Parameterized {
            name: name.into(),
            params: params.to_vec(),
        })
    }

    fn serial() -> Self {
        Col::simple("bigserial").read_only()
    }

    fn varchar(max: u32) -> Self {
        let mut c = Col::with_params("varchar", &[max]);
        c.rule.max_length = Some(max);
        c
    }

    fn text() -> Self {
        Col::simple("text")
    }

    fn positive_integer() -> Self {
        let mut c = Col::simple("integer");
        c.rule.minimum = Some(0.0);
        c.non_negative = true;
        c
    }

    fn decimal(precision: u32, scale: u32) -> Self {
        Col::with_params("numeric", &[precision, scale])
    }

    fn boolean(default: bool) -> Self {
        Col::simple("boolean").default_literal(if default { "true" } else { "false" })
    }

    /// Timestamp set by the database on insert and never written through the API.
    fn created_now() -> Self {
        let mut c = Col::simple("timestamptz").read_only();
        c.default = Some(ColumnDefaultConfig::Expression("NOW()".into()));
        c
    }

    fn enumeration(schema_name: &str, type_name: &str, values: &[&str]) -> Self {
        let mut c = Col::simple(&format!("{}.{}", schema_name, type_name));
        c.rule.allowed = Some(values.iter().map(|v| serde_json::Value::String(v.to_string())).collect());
        c
    }

    fn foreign_key() -> Self {
        Col::simple("bigint")
    }

    fn nullable(mut self) -> Self {
        self.nullable = true;
        self.rule.required = None;
        self
    }

    /// Literal SQL default. The column stops being required in requests.
    fn default_literal(mut self, sql: &str) -> Self {
        self.default = Some(ColumnDefaultConfig::Literal(sql.into()));
        self.rule.required = None;
        self
    }

    fn read_only(mut self) -> Self {
        self.read_only = true;
        self.rule.required = None;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn format(mut self, format: &str) -> Self {
        self.rule.format = Some(format.into());
        self
    }

    fn pattern(mut self, pattern: &str) -> Self {
        self.rule.pattern = Some(pattern.into());
        self
    }

    /// Required in API requests even though storage allows NULL.
    fn api_required(mut self) -> Self {
        self.rule.required = Some(true);
        self
    }
}

struct TableDef {
    name: &'static str,
    columns: Vec<(&'static str, Col)>,
    /// (fk column, parent table). All cascade on delete.
    parents: Vec<(&'static str, &'static str)>,
    sensitive: Vec<&'static str>,
    credentials: Option<CredentialConfig>,
}

impl TableDef {
    fn new(name: &'static str) -> Self {
        TableDef {
            name,
            columns: vec![("id", Col::serial())],
            parents: Vec::new(),
            sensitive: Vec::new(),
            credentials: None,
        }
    }

    fn col(mut self, name: &'static str, col: Col) -> Self {
        self.columns.push((name, col));
        self
    }

    fn parent(mut self, fk_column: &'static str, table: &'static str) -> Self {
        self.columns.push((fk_column, Col::foreign_key()));
        self.parents.push((fk_column, table));
        self
    }
}

struct SchemaBuilder {
    schema_id: String,
    config: FullConfig,
}

impl SchemaBuilder {
    fn new(schema_name: &str) -> Self {
        let schema_id = schema_name.to_string();
        let config = FullConfig {
            schemas: vec![SchemaConfig {
                id: schema_id.clone(),
                name: schema_name.to_string(),
                comment: Some("course management".into()),
            }],
            ..Default::default()
        };
        SchemaBuilder { schema_id, config }
    }

    fn enumeration(&mut self, name: &str, values: &[&str]) {
        self.config.enums.push(EnumConfig {
            id: name.to_string(),
            schema_id: Some(self.schema_id.clone()),
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
    }

    fn table(&mut self, def: TableDef) {
        let table_id = def.name.to_string();
        let mut unique = Vec::new();
        let mut check = Vec::new();
        let mut validation = HashMap::new();
        let mut read_only_columns = Vec::new();

        for (name, col) in &def.columns {
            self.config.columns.push(ColumnConfig {
                id: column_id(def.name, name),
                table_id: table_id.clone(),
                name: name.to_string(),
                type_: col.ty.clone(),
                nullable: col.nullable,
                default: col.default.clone(),
                comment: None,
            });
            if col.unique {
                unique.push(vec![name.to_string()]);
            }
            if col.non_negative {
                check.push(TableCheck {
                    name: format!("{}_{}_check", def.name, name),
                    expression: format!("\"{}\" >= 0", name),
                });
            }
            if col.read_only {
                read_only_columns.push(name.to_string());
            } else {
                validation.insert(name.to_string(), col.rule.clone());
            }
        }

        self.config.tables.push(TableConfig {
            id: table_id.clone(),
            schema_id: Some(self.schema_id.clone()),
            name: def.name.to_string(),
            comment: None,
            primary_key: PrimaryKeyConfig::Single("id".into()),
            unique,
            check,
        });

        for (fk_column, parent) in &def.parents {
            self.config.indexes.push(IndexConfig {
                id: format!("{}_{}_idx", def.name, fk_column),
                table_id: table_id.clone(),
                name: format!("{}_{}_idx", def.name, fk_column),
                unique: false,
                columns: vec![fk_column.to_string()],
            });
            self.config.relationships.push(RelationshipConfig {
                id: format!("{}_{}_fkey", def.name, fk_column),
                from_schema_id: self.schema_id.clone(),
                from_table_id: table_id.clone(),
                from_column_id: column_id(def.name, fk_column),
                to_schema_id: self.schema_id.clone(),
                to_table_id: parent.to_string(),
                to_column_id: column_id(parent, "id"),
                on_delete: Some("CASCADE".into()),
                name: None,
            });
        }

        self.config.api_entities.push(ApiEntityConfig {
            entity_id: table_id,
            path_segment: def.name.to_string(),
            operations: CRUD.iter().map(|o| o.to_string()).collect(),
            sensitive_columns: def.sensitive.iter().map(|s| s.to_string()).collect(),
            read_only_columns,
            credentials: def.credentials,
            validation,
        });
    }
}

fn column_id(table: &str, column: &str) -> String {
    format!("{}.{}", table, column)
}

/// The full course-management schema inside PostgreSQL schema `schema_name`.
pub fn course_schema(schema_name: &str) -> FullConfig {
    let mut b = SchemaBuilder::new(schema_name);
    b.enumeration("user_role", USER_ROLES);
    b.enumeration("course_level", COURSE_LEVELS);
    b.enumeration("question_type", QUESTION_TYPES);

    let mut users = TableDef::new("users")
        .col("email", Col::varchar(255).format("email").unique())
        .col("username", Col::varchar(150).pattern(r"^[\w.@+-]+$").unique())
        .col("password", Col::varchar(128).default_literal("'!'"))
        .col("first_name", Col::varchar(30).default_literal("''"))
        .col("last_name", Col::varchar(30).default_literal("''"))
        .col("date_of_birth", Col::simple("date").format("date").nullable().api_required())
        .col("profile_picture", Col::varchar(100).nullable())
        .col(
            "role",
            Col::enumeration(schema_name, "user_role", USER_ROLES).default_literal("'student'"),
        )
        .col("is_active", Col::boolean(true))
        .col("is_staff", Col::boolean(false))
        .col("is_superuser", Col::boolean(false).read_only())
        .col("last_login", Col::simple("timestamptz").nullable().read_only());
    users.sensitive.push("password");
    users.credentials = Some(CredentialConfig {
        login_column: "email".into(),
        password_column: "password".into(),
        active_column: "is_active".into(),
    });
    b.table(users);

    b.table(
        TableDef::new("courses")
            .col("title", Col::varchar(100))
            .col("description", Col::text())
            .col("cover_image", Col::varchar(100).nullable())
            .col("duration", Col::positive_integer())
            .col("level", Col::enumeration(schema_name, "course_level", COURSE_LEVELS))
            .col("category", Col::varchar(100))
            .parent("instructor_id", "users")
            .col("enrollment_fee", Col::decimal(10, 2)),
    );

    b.table(
        TableDef::new("lessons")
            .col("title", Col::varchar(100))
            .col("description", Col::text())
            .col("content", Col::text())
            .col("duration", Col::positive_integer())
            .col("sequence_number", Col::positive_integer())
            .parent("course_id", "courses"),
    );

    b.table(
        TableDef::new("enrollments")
            .parent("user_id", "users")
            .parent("course_id", "courses")
            .col("enrollment_date", Col::created_now())
            .col("completion_status", Col::boolean(false))
            .col("grade", Col::decimal(5, 2).nullable()),
    );

    b.table(
        TableDef::new("reviews")
            .parent("user_id", "users")
            .parent("course_id", "courses")
            .col("rating", Col::positive_integer())
            .col("comment", Col::text())
            .col("date", Col::created_now()),
    );

    b.table(
        TableDef::new("quizzes")
            .col("title", Col::varchar(100))
            .col("description", Col::text())
            .parent("course_id", "courses")
            .col("pass_mark", Col::decimal(5, 2))
            .col("duration", Col::positive_integer()),
    );

    b.table(
        TableDef::new("questions")
            .col("text", Col::text())
            .col("type", Col::enumeration(schema_name, "question_type", QUESTION_TYPES))
            .col("options", Col::simple("jsonb"))
            .col("correct_answer", Col::varchar(100))
            .parent("quiz_id", "quizzes"),
    );

    b.table(
        TableDef::new("answers")
            .parent("user_id", "users")
            .parent("question_id", "questions")
            .col("response", Col::varchar(100))
            .col("submission_date", Col::created_now()),
    );

    b.config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relationship_cascades() {
        let config = course_schema("onset");
        assert_eq!(config.relationships.len(), 10);
        assert!(config.relationships.iter().all(RelationshipConfig::cascades_on_delete));
    }

    #[test]
    fn user_email_and_username_are_unique() {
        let config = course_schema("onset");
        let users = config.tables.iter().find(|t| t.id == "users").unwrap();
        assert!(users.unique.contains(&vec!["email".to_string()]));
        assert!(users.unique.contains(&vec!["username".to_string()]));
    }

    #[test]
    fn role_defaults_to_student() {
        let config = course_schema("onset");
        let role = config.columns.iter().find(|c| c.id == "users.role").unwrap();
        assert!(matches!(&role.default, Some(ColumnDefaultConfig::Literal(s)) if s == "'student'"));
        assert_eq!(role.type_.base_name(), "onset.user_role");
    }

    #[test]
    fn positive_integers_get_check_constraints() {
        let config = course_schema("onset");
        let reviews = config.tables.iter().find(|t| t.id == "reviews").unwrap();
        assert_eq!(reviews.check.len(), 1);
        assert_eq!(reviews.check[0].expression, "\"rating\" >= 0");
        let lessons = config.tables.iter().find(|t| t.id == "lessons").unwrap();
        assert_eq!(lessons.check.len(), 2);
    }

    #[test]
    fn enrollment_date_is_read_only_with_database_default() {
        let config = course_schema("onset");
        let api = config.api_entities.iter().find(|a| a.entity_id == "enrollments").unwrap();
        assert!(api.read_only_columns.contains(&"enrollment_date".to_string()));
        assert!(!api.validation.contains_key("enrollment_date"));
        let col = config.columns.iter().find(|c| c.id == "enrollments.enrollment_date").unwrap();
        assert!(matches!(&col.default, Some(ColumnDefaultConfig::Expression(e)) if e == "NOW()"));
    }

    #[test]
    fn enumerations_are_validated_in_requests() {
        let config = course_schema("onset");
        let api = config.api_entities.iter().find(|a| a.entity_id == "questions").unwrap();
        let allowed = api.validation["type"].allowed.as_ref().unwrap();
        assert_eq!(allowed.len(), 2);
        assert!(allowed.contains(&serde_json::json!("true-false")));
    }

    #[test]
    fn every_foreign_key_is_indexed() {
        let config = course_schema("onset");
        assert_eq!(config.indexes.len(), config.relationships.len());
    }

    #[test]
    fn schema_name_is_applied_everywhere() {
        let config = course_schema("lms");
        assert_eq!(config.schemas[0].name, "lms");
        let level = config.columns.iter().find(|c| c.id == "courses.level").unwrap();
        assert_eq!(level.type_.base_name(), "lms.course_level");
    }
}
