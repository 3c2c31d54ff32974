//! End-to-end browsing against a live server.

mod common;

use pgexplorer::{
    ExecutorKind, Explorer, ExplorerConfig, FilterDescriptor, SortDescriptor, TableDataRequest,
    TableTarget,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

/// Creates a fresh table and drops it when the test finishes.
struct Fixture {
    explorer: Explorer,
    profile: pgexplorer::ConnectionProfile,
    table: String,
}

impl Fixture {
    async fn new(id: i64) -> Option<Self> {
        let profile = common::profile(id)?;
        let explorer = Explorer::in_memory(ExplorerConfig::default()).unwrap();
        let table = common::unique_table("pgexplorer_it");
        explorer
            .run_sql(
                &profile,
                None,
                &format!(
                    "CREATE TABLE public.{table} (id int PRIMARY KEY, name text, age int, note text);
                     INSERT INTO public.{table} VALUES
                       (1, 'alice', 30, NULL), (2, 'bob', 17, 'x'), (3, 'carol', 45, NULL),
                       (4, 'dave', 22, 'y'), (5, 'erin', 51, NULL)"
                ),
            )
            .await
            .unwrap();
        Some(Self {
            explorer,
            profile,
            table,
        })
    }

    fn target(&self) -> TableTarget {
        TableTarget::new("public", &self.table)
    }

    async fn drop_table(self) {
        self.explorer
            .run_sql(&self.profile, None, &format!("DROP TABLE public.{}", self.table))
            .await
            .unwrap();
        assert!(self.explorer.factory().registered_keys().is_empty());
    }
}

#[tokio::test]
async fn browse_with_filters_sorting_and_paging() {
    let Some(fx) = Fixture::new(21).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let request = TableDataRequest::new(fx.target())
        .page(1)
        .per_page(2)
        .filters(vec![FilterDescriptor::new("age", "gte", "18")])
        .sorts(vec![SortDescriptor::desc("age")]);
    let page = fx.explorer.table_data(&fx.profile, &request).await.unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0]["name"], json!("erin"));
    assert_eq!(page.data[1]["name"], json!("carol"));

    let page2 = fx
        .explorer
        .table_data(&fx.profile, &request.clone().page(2))
        .await
        .unwrap();
    assert_eq!(page2.data[0]["name"], json!("alice"));
    assert_eq!(page2.data[1]["name"], json!("dave"));

    let history = fx.explorer.query_history(21).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].executor, ExecutorKind::System);
    assert!(history[0].query.contains("OFFSET 2"));
    assert!(history[0].query.contains("age >= '18'"));
    assert_eq!(
        history[0].tag.as_deref(),
        Some(format!("Query on public.{} with filters and sorting", fx.table).as_str())
    );

    fx.drop_table().await;
}

#[tokio::test]
async fn unfiltered_browse_is_not_logged() {
    let Some(fx) = Fixture::new(22).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let page = fx
        .explorer
        .table_data(&fx.profile, &TableDataRequest::new(fx.target()))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.data.len(), 5);
    assert!(fx.explorer.query_history(22).await.unwrap().is_empty());

    fx.drop_table().await;
}

#[tokio::test]
async fn injection_attempts_stay_inert() {
    let Some(fx) = Fixture::new(23).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let request = TableDataRequest::new(fx.target()).filters(vec![
        FilterDescriptor::new("name", "eq", "x' OR '1'='1"),
        FilterDescriptor::new("age; DROP TABLE users", "drop", "1"),
    ]);
    let page = fx.explorer.table_data(&fx.profile, &request).await.unwrap();
    assert_eq!(page.total, 0);

    let count = fx
        .explorer
        .table_count(&fx.profile, &fx.target(), &[FilterDescriptor::new("note", "is", "null")])
        .await
        .unwrap();
    assert_eq!(count, 3);

    fx.drop_table().await;
}

#[tokio::test]
async fn row_mutations_are_keyed_and_logged() {
    let Some(fx) = Fixture::new(24).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let target = fx.target();

    let inserted = fx
        .explorer
        .insert_row(&fx.profile, &target, &object(json!({"id": 6, "name": "frank", "note": ""})), Some(7))
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let updated = fx
        .explorer
        .update_row(
            &fx.profile,
            &target,
            &object(json!({"age": 33})),
            &object(json!({"note": null, "name": "frank"})),
            Some(7),
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let deleted = fx
        .explorer
        .delete_row(&fx.profile, &target, &object(json!({"id": 2})), Some(7))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let rows = fx
        .explorer
        .run_sql(&fx.profile, None, &format!("SELECT age FROM public.{} WHERE id = 6", fx.table))
        .await
        .unwrap();
    assert_eq!(rows[0]["age"], json!("33"));

    let history = fx.explorer.query_history(24).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.executor == ExecutorKind::User && e.executor_id == Some(7)));
    assert_eq!(
        history[2].query,
        format!("INSERT INTO public.{} (id, name, note) VALUES ('6', 'frank', NULL)", fx.table)
    );

    fx.drop_table().await;
}

#[tokio::test]
async fn ad_hoc_batches_and_diagnostics() {
    let Some(fx) = Fixture::new(25).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let sql = format!(
        "UPDATE public.{t} SET note = 'z;z' WHERE id = 1; SELECT id, note FROM public.{t} WHERE id = 1;",
        t = fx.table
    );
    let resp = fx.explorer.execute_query(&fx.profile, None, &sql, Some(3)).await;
    assert!(resp.success);
    assert!(resp.multi_statement);
    assert_eq!(resp.statements_count, 2);
    assert_eq!(resp.data.as_ref().unwrap()[0]["note"], json!("z;z"));

    let bad = format!(
        "UPDATE public.{t} SET age = 0; SELECT nope FROM public.{t}",
        t = fx.table
    );
    let resp = fx.explorer.execute_query(&fx.profile, None, &bad, Some(3)).await;
    assert!(!resp.success);
    assert_eq!(resp.sql_state.as_deref(), Some("42703"));
    assert_eq!(resp.code.as_deref(), Some("42"));
    assert!(resp.position.is_some());

    // Rolled back: no age was zeroed.
    let zeroed = fx
        .explorer
        .table_count(&fx.profile, &fx.target(), &[FilterDescriptor::new("age", "eq", 0)])
        .await
        .unwrap();
    assert_eq!(zeroed, 0);

    let history = fx.explorer.query_history(25).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query, sql.trim());

    fx.drop_table().await;
}

#[tokio::test]
async fn catalog_listing_and_metadata() {
    let Some(fx) = Fixture::new(26).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let databases = fx.explorer.list_databases(&fx.profile).await.unwrap();
    assert!(databases.iter().any(|d| d == fx.profile.database()));

    let schemas = fx.explorer.list_schemas(&fx.profile, None).await.unwrap();
    assert!(schemas.iter().any(|s| s == "public"));

    let tables = fx.explorer.list_tables(&fx.profile, None).await.unwrap();
    assert!(tables.iter().any(|t| t.table_name == fx.table && t.table_schema == "public"));
    assert!(tables.iter().all(|t| t.table_schema != "pg_catalog"));

    let columns = fx.explorer.list_columns(&fx.profile, &fx.target()).await.unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(names, ["id", "name", "age", "note"]);
    assert!(columns[0].is_primary_key);
    assert!(!columns[0].is_nullable);
    assert!(!columns[1].is_primary_key);
    assert_eq!(columns[2].data_type, "integer");

    let mut profile = fx.profile.clone();
    profile.metadata.insert("label".into(), json!("keep me"));
    let meta = fx.explorer.refresh_metadata(&mut profile, None).await.unwrap();
    assert!(meta.version.as_deref().unwrap_or_default().starts_with("PostgreSQL"));
    assert!(meta.server.is_some());
    assert_eq!(profile.metadata["label"], json!("keep me"));
    assert_eq!(profile.metadata["database"], json!(profile.database()));

    fx.drop_table().await;
}

#[tokio::test]
async fn stored_query_by_name() {
    let Some(fx) = Fixture::new(27).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let params: HashMap<String, String> = [
        ("schema", "public"),
        ("table", fx.table.as_str()),
        ("limit", "2"),
        ("offset", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let rows = fx
        .explorer
        .execute_stored_query(&fx.profile, None, "table_data", &params)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let history = fx.explorer.query_history(27).await.unwrap();
    assert_eq!(history[0].tag.as_deref(), Some("table_data"));
    assert_eq!(history[0].executor, ExecutorKind::System);

    let err = fx
        .explorer
        .execute_stored_query(&fx.profile, None, "drop_everything", &params)
        .await
        .unwrap_err();
    assert!(matches!(err, pgexplorer::ExplorerError::TemplateNotFound(_)));

    fx.drop_table().await;
}

#[tokio::test]
async fn browse_decodes_every_column_type() {
    let Some(profile) = common::profile(28) else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let explorer = Explorer::in_memory(ExplorerConfig::default()).unwrap();
    let table = common::unique_table("pgexplorer_types");
    explorer
        .run_sql(
            &profile,
            None,
            &format!(
                "CREATE TABLE public.{table} (
                   id int PRIMARY KEY, iv interval, ip inet, net cidr, big numeric,
                   ts timestamp, tz timestamptz, m money, fa float8[], mac macaddr,
                   pt point, bits bit(4), mood_label \"char\");
                 INSERT INTO public.{table} VALUES (
                   1, '1 day', '127.0.0.1', '10.0.0.0/8',
                   123456789012345678901234567890123456789, 'infinity', '-infinity',
                   '12.50', '{{1.5,2.5}}', '08:00:2b:01:02:03', '(1,2)', B'1010', 'h')"
            ),
        )
        .await
        .unwrap();

    let page = explorer
        .table_data(&profile, &TableDataRequest::new(TableTarget::new("public", &table)))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let row = &page.data[0];
    assert_eq!(row["id"], json!(1));
    assert_eq!(row["iv"], json!("1 day"));
    assert_eq!(row["ip"], json!("127.0.0.1"));
    assert_eq!(row["net"], json!("10.0.0.0/8"));
    assert_eq!(row["big"], json!("123456789012345678901234567890123456789"));
    assert_eq!(row["ts"], json!("infinity"));
    assert_eq!(row["tz"], json!("-infinity"));
    assert!(row["m"].as_str().unwrap().contains("12.50"));
    assert_eq!(row["fa"], json!([1.5, 2.5]));
    assert_eq!(row["mac"], json!("08:00:2b:01:02:03"));
    assert_eq!(row["pt"], json!({"x": 1.0, "y": 2.0}));
    assert_eq!(row["bits"], json!("1010"));
    assert_eq!(row["mood_label"], json!("h"));

    // The raw SQL path sees the same values in the server's text form.
    let raw = explorer
        .run_sql(&profile, None, &format!("SELECT iv, ip, big, ts FROM public.{table}"))
        .await
        .unwrap();
    assert_eq!(raw[0]["iv"], row["iv"]);
    assert_eq!(raw[0]["ip"], row["ip"]);
    assert_eq!(raw[0]["big"], row["big"]);
    assert_eq!(raw[0]["ts"], row["ts"]);

    explorer
        .run_sql(&profile, None, &format!("DROP TABLE public.{table}"))
        .await
        .unwrap();
    assert!(explorer.factory().registered_keys().is_empty());
}
