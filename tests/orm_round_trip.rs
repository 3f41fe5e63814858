//! Statement generation against the dialects, and live execution against
//! in-memory SQLite.

use keel_orm::{
    assign, col, count, middleware, not, raw, raw_query, Db, Deleter, Entity, Handler, Inserter,
    MySqlDialect, OrmError, QueryContext, Selector, Table, Updater, Value,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, PartialEq, Entity)]
struct TestModel {
    id: i64,
    first_name: String,
    age: i8,
    last_name: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Entity)]
struct OrderDetail {
    order_id: i64,
    item_id: i64,
}

fn person(id: i64, first_name: &str, age: i8) -> TestModel {
    TestModel {
        id,
        first_name: first_name.to_string(),
        age,
        last_name: None,
    }
}

async fn mysql_db() -> Db {
    Db::builder()
        .max_connections(1)
        .dialect(Arc::new(MySqlDialect))
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn live_db() -> Db {
    let db = Db::builder()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    raw_query::<TestModel, _>(
        &db,
        "CREATE TABLE test_model (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL, age INTEGER NOT NULL, last_name TEXT)",
        [],
    )
    .exec()
    .await
    .unwrap();
    db
}

#[tokio::test]
async fn multi_row_insert_emits_explicit_columns() {
    let db = mysql_db().await;
    let statement = Inserter::<TestModel>::new(&db)
        .columns(["id", "first_name"])
        .values([person(1, "Tom", 0), person(2, "Tom1", 0)])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "INSERT INTO `test_model`(`id`,`first_name`) VALUES (?,?),(?,?);"
    );
    assert_eq!(
        statement.args,
        vec![
            Value::I64(1),
            Value::Text("Tom".to_string()),
            Value::I64(2),
            Value::Text("Tom1".to_string()),
        ]
    );
}

#[tokio::test]
async fn insert_without_columns_uses_declaration_order() {
    let db = mysql_db().await;
    let statement = Inserter::<TestModel>::new(&db)
        .values([person(1, "Tom", 18)])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "INSERT INTO `test_model`(`id`,`first_name`,`age`,`last_name`) VALUES (?,?,?,?);"
    );
    assert_eq!(statement.args[3], Value::Null);
}

#[tokio::test]
async fn inserting_nothing_is_an_error() {
    let db = mysql_db().await;
    let err = Inserter::<TestModel>::new(&db).build().unwrap_err();
    assert!(matches!(err, OrmError::InsertZeroRows));
}

#[tokio::test]
async fn sqlite_upsert_names_the_conflict_target() {
    let db = live_db().await;
    let statement = Inserter::<TestModel>::new(&db)
        .columns(["id", "first_name", "age"])
        .values([person(1, "Tom", 18)])
        .upsert()
        .conflict_columns(["id"])
        .update([
            assign("first_name", "Jerry").into(),
            assign("age", 19).into(),
        ])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "INSERT INTO `test_model`(`id`,`first_name`,`age`) VALUES (?,?,?) \
         ON CONFLICT(`id`) DO UPDATE SET `first_name`=?,`age`=?;"
    );
}

#[tokio::test]
async fn mysql_upsert_uses_duplicate_key_and_values() {
    let db = mysql_db().await;
    let statement = Inserter::<TestModel>::new(&db)
        .columns(["id", "first_name"])
        .values([person(1, "Tom", 0)])
        .upsert()
        .update([assign("age", 19).into(), col("first_name").into()])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "INSERT INTO `test_model`(`id`,`first_name`) VALUES (?,?) \
         ON DUPLICATE KEY UPDATE `age`=?,`first_name`=VALUES(`first_name`);"
    );
}

#[tokio::test]
async fn predicates_parenthesize_nested_predicates() {
    let db = mysql_db().await;
    let statement = Selector::<TestModel>::new(&db)
        .where_(col("age").gt(18).and(col("first_name").eq("Tom")))
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `test_model` WHERE (`age` > ?) AND (`first_name` = ?);"
    );
    assert_eq!(
        statement.args,
        vec![Value::I64(18), Value::Text("Tom".to_string())]
    );

    let statement = Selector::<TestModel>::new(&db)
        .where_(not(col("id").eq(1)))
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `test_model` WHERE NOT (`id` = ?);"
    );
}

#[tokio::test]
async fn unknown_fields_fail_at_build_time() {
    let db = mysql_db().await;
    let err = Selector::<TestModel>::new(&db)
        .where_(col("invalid").eq(1))
        .build()
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownField(name) if name == "invalid"));
}

#[tokio::test]
async fn projections_support_aggregates_and_raw_sql() {
    let db = mysql_db().await;
    let statement = Selector::<TestModel>::new(&db)
        .select([
            col("id").into(),
            count("id").as_alias("total").into(),
            raw("LENGTH(`first_name`)", []).into(),
        ])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT `id`,COUNT(`id`) AS `total`,LENGTH(`first_name`) FROM `test_model`;"
    );
}

#[tokio::test]
async fn joins_emit_on_and_using() {
    let db = mysql_db().await;
    let orders = Table::of::<TestModel>().alias("t1");
    let details = Table::of::<OrderDetail>().alias("t2");
    let joined = orders
        .clone()
        .join(details.clone())
        .on([orders.col("id").eq(details.col("order_id"))]);
    let statement = Selector::<TestModel>::new(&db)
        .from(joined)
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM (`test_model` AS `t1` JOIN `order_detail` AS `t2` \
         ON `t1`.`id` = `t2`.`order_id`);"
    );

    let statement = Selector::<TestModel>::new(&db)
        .from(
            Table::of::<TestModel>()
                .left_join(Table::of::<OrderDetail>())
                .using(["id"]),
        )
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM (`test_model` LEFT JOIN `order_detail` USING (`id`));"
    );
}

#[tokio::test]
async fn update_and_delete_emit_where_clauses() {
    let db = mysql_db().await;
    let statement = Updater::<TestModel>::new(&db)
        .set([assign("age", 19).into()])
        .where_(col("id").eq(1))
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "UPDATE `test_model` SET `age`=? WHERE `id` = ?;"
    );

    let statement = Deleter::<TestModel>::new(&db)
        .where_(col("id").eq(1))
        .build()
        .unwrap();
    assert_eq!(statement.sql, "DELETE FROM `test_model` WHERE `id` = ?;");
}

#[tokio::test]
async fn column_to_column_copy_in_set() {
    let db = mysql_db().await;
    let statement = Updater::<TestModel>::new(&db)
        .set([assign("first_name", col("last_name")).into()])
        .build()
        .unwrap();
    assert_eq!(
        statement.sql,
        "UPDATE `test_model` SET `first_name`=`last_name`;"
    );
}

#[tokio::test]
async fn full_crud_against_sqlite() {
    let db = live_db().await;

    Inserter::<TestModel>::new(&db)
        .values([person(1, "Tom", 18), person(2, "Jerry", 20)])
        .exec()
        .await
        .unwrap();

    let tom = Selector::<TestModel>::new(&db)
        .where_(col("id").eq(1))
        .get()
        .await
        .unwrap();
    assert_eq!(tom, person(1, "Tom", 18));

    let all = Selector::<TestModel>::new(&db).get_multi().await.unwrap();
    assert_eq!(all.len(), 2);

    let missing = Selector::<TestModel>::new(&db)
        .where_(col("id").eq(99))
        .get()
        .await
        .unwrap_err();
    assert!(matches!(missing, OrmError::NoRows));

    let updated = Updater::<TestModel>::new(&db)
        .set([assign("age", 21).into()])
        .where_(col("first_name").eq("Jerry"))
        .exec()
        .await
        .unwrap();
    assert_eq!(updated.rows_affected, 1);

    let jerry = Selector::<TestModel>::new(&db)
        .where_(col("id").eq(2))
        .get()
        .await
        .unwrap();
    assert_eq!(jerry.age, 21);

    let deleted = Deleter::<TestModel>::new(&db)
        .where_(col("id").eq(1))
        .exec()
        .await
        .unwrap();
    assert_eq!(deleted.rows_affected, 1);

    let remaining = Selector::<TestModel>::new(&db).get_multi().await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn upsert_executes_on_sqlite() {
    let db = live_db().await;
    for first_name in ["Tom", "Rewritten"] {
        let mut row = person(1, first_name, 18);
        row.last_name = Some("Cat".to_string());
        Inserter::<TestModel>::new(&db)
            .values([row])
            .upsert()
            .conflict_columns(["id"])
            .update([assign("first_name", first_name).into()])
            .exec()
            .await
            .unwrap();
    }
    let stored = Selector::<TestModel>::new(&db)
        .where_(col("id").eq(1))
        .get()
        .await
        .unwrap();
    assert_eq!(stored.first_name, "Rewritten");
}

#[tokio::test]
async fn middlewares_observe_every_statement() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let query_log = middleware(move |next: Handler| {
        let sink = Arc::clone(&sink);
        Arc::new(move |qc: QueryContext| {
            sink.lock().unwrap().push(qc.statement.sql.clone());
            next(qc)
        })
    });
    let db = Db::builder()
        .max_connections(1)
        .middleware(query_log)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    raw_query::<TestModel, _>(
        &db,
        "CREATE TABLE test_model (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL, age INTEGER NOT NULL, last_name TEXT)",
        [],
    )
    .exec()
    .await
    .unwrap();

    Inserter::<TestModel>::new(&db)
        .columns(["id", "first_name", "age"])
        .values([person(1, "Tom", 18)])
        .exec()
        .await
        .unwrap();
    let _ = Selector::<TestModel>::new(&db)
        .where_(col("id").eq(1))
        .get()
        .await
        .unwrap();

    let seen = log.lock().unwrap();
    assert!(seen
        .iter()
        .any(|sql| sql.starts_with("INSERT INTO `test_model`")));
    assert!(seen
        .iter()
        .any(|sql| sql == "SELECT * FROM `test_model` WHERE `id` = ?;"));
}

#[tokio::test]
async fn transactions_commit_and_roll_back() {
    let db = live_db().await;

    // Committed work is visible afterwards.
    db.in_tx(|tx| async move {
        Inserter::<TestModel>::new(&tx)
            .values([person(1, "Tom", 18)])
            .exec()
            .await?;
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(
        Selector::<TestModel>::new(&db)
            .get_multi()
            .await
            .unwrap()
            .len(),
        1
    );

    // A returned error rolls the work back.
    let err = db
        .in_tx(|tx| async move {
            Inserter::<TestModel>::new(&tx)
                .values([person(2, "Jerry", 20)])
                .exec()
                .await?;
            Err::<(), _>(OrmError::NoRows)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NoRows));
    assert_eq!(
        Selector::<TestModel>::new(&db)
            .get_multi()
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn panicking_transaction_bodies_roll_back() {
    let db = live_db().await;
    let err = db
        .in_tx(|tx| async move {
            Inserter::<TestModel>::new(&tx)
                .values([person(3, "Ghost", 0)])
                .exec()
                .await?;
            panic!("middle of the transaction");
            #[allow(unreachable_code)]
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::TxPanic));
    assert_eq!(
        Selector::<TestModel>::new(&db)
            .get_multi()
            .await
            .unwrap()
            .len(),
        0
    );
}
