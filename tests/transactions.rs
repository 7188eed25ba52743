//! Transaction lifecycle over the scripted driver.

mod common;

use std::sync::atomic::Ordering;

use common::{count_row, scripted_backend, Product};
use futures::FutureExt;
use modelkit::prelude::*;

#[tokio::test]
async fn committed_transaction_runs_everything_on_one_connection() {
	let (script, db) = scripted_backend();
	let products: Repository<Product> = Repository::new(db.clone());

	db.transaction(|tx| {
		let products = products.bind(tx);
		async move {
			let mut socks = Product::new("Thunder Socks", 5.55);
			products.save(&mut socks).await?;
			products
				.update(record! { "price" => 6.66 }, socks.id().unwrap())
				.await?;
			Ok(())
		}
		.boxed()
	})
	.await
	.unwrap();

	let sql = script.sql();
	assert_eq!(sql.first().map(String::as_str), Some("BEGIN"));
	assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
	assert!(sql[1].starts_with("INSERT INTO products"));
	assert!(sql[2].starts_with("UPDATE products SET price = ?"));
	assert_eq!(script.acquired.load(Ordering::SeqCst), 1);
	assert_eq!(script.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_transaction_rolls_back_and_surfaces_the_error() {
	let (script, db) = scripted_backend();
	script.fail_on("UPDATE");
	let products: Repository<Product> = Repository::new(db.clone());

	let err = db
		.transaction(|tx| {
			let products = products.bind(tx);
			async move {
				let mut socks = Product::new("Thunder Socks", 5.55);
				products.save(&mut socks).await?;
				products
					.update(record! { "price" => 6.66 }, socks.id().unwrap())
					.await?;
				Ok(())
			}
			.boxed()
		})
		.await
		.unwrap_err();

	assert!(matches!(err, DatabaseError::Connection(_)));
	assert_eq!(script.sql().last().map(String::as_str), Some("ROLLBACK"));
	assert_eq!(script.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn join_table_purchase_flow() {
	let (script, db) = scripted_backend();

	// stock check then link-row insert, atomically
	let quantity = db
		.transaction(|tx| {
			async move {
				let stock_rows = tx
					.select(
						"join_products_warehouses",
						record! { "product_id" => 2, "warehouse_id" => 1 },
					)
					.await?;
				let quantity: i64 = match stock_rows.first() {
					Some(row) => row.get("quantity")?,
					None => 0,
				};
				let link = record! {
					"product_id" => 2,
					"warehouse_id" => 1,
					"quantity" => quantity + 5,
				};
				tx.insert("join_products_warehouses", vec![link]).await?;
				Ok(quantity + 5)
			}
			.boxed()
		})
		.await
		.unwrap();

	assert_eq!(quantity, 5);
	assert_eq!(
		script.sql(),
		vec![
			"BEGIN",
			"SELECT * FROM join_products_warehouses WHERE product_id = ? AND warehouse_id = ?",
			"INSERT INTO join_products_warehouses (product_id, warehouse_id, quantity) VALUES (?, ?, ?)",
			"COMMIT",
		]
	);
}

#[tokio::test]
async fn transaction_clone_cannot_outlive_its_transaction() {
	let (_script, db) = scripted_backend();

	let leaked = db
		.transaction(|tx| async move { Ok(tx.clone()) }.boxed())
		.await
		.unwrap();

	let err = leaked
		.count("products", Filter::All)
		.await
		.unwrap_err();
	assert!(matches!(err, DatabaseError::Transaction(_)));
}

#[tokio::test]
async fn failed_operation_still_releases_its_connection() {
	let (script, db) = scripted_backend();
	script.fail_on("DELETE");

	let err = db.delete("products", 1).await.unwrap_err();

	assert!(matches!(err, DatabaseError::Connection(_)));
	assert_eq!(script.acquired.load(Ordering::SeqCst), 1);
	assert_eq!(script.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_transactional_batches_do_not_share_connections() {
	let (script, db) = scripted_backend();

	script.push_rows(vec![count_row(0)]);
	db.count("products", Filter::All).await.unwrap();
	script.push_rows(vec![count_row(0)]);
	db.count("products", Filter::All).await.unwrap();

	assert_eq!(script.acquired.load(Ordering::SeqCst), 2);
	assert_eq!(script.released.load(Ordering::SeqCst), 2);
}
