use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use tempfile::TempDir;

use engine::{
    CreateInvoiceCmd, DirectPaymentCmd, Engine, EngineError, ErrorKind, Invoice,
    InvoiceListFilter, InvoiceStatus, PaymentMethod, RecordExpenseCmd, RecordPaymentCmd,
    RecordTransactionCmd, SchoolFinance, StudentFinance, TransactionKind, TransactionListFilter,
    TransactionStatus, UpdateExpenseCmd, UserRole,
};
use migration::MigratorTrait;
use uuid::Uuid;

const ADMIN: &str = "admin";
const CLERK: &str = "clerk";
const VIEWER: &str = "viewer";

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    engine_on("sqlite::memory:", engine::DEFAULT_CONFLICT_RETRIES).await
}

async fn engine_on(url: &str, conflict_retries: u32) -> (Engine, DatabaseConnection) {
    let db = Database::connect(url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();
    for (username, role) in [(ADMIN, "ADMIN"), (VIEWER, "VIEWER")] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, password, role) VALUES (?, ?, ?)",
            vec![username.into(), "password".into(), role.into()],
        ))
        .await
        .unwrap();
    }
    let engine = Engine::builder()
        .database(db.clone())
        .conflict_retries(conflict_retries)
        .build()
        .await
        .unwrap();
    engine
        .ensure_user(CLERK, "password", UserRole::Accountant)
        .await
        .unwrap();
    (engine, db)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn new_student(engine: &Engine) -> Uuid {
    engine
        .new_student("Ada", "Lovelace", Some("5"), ADMIN)
        .await
        .unwrap()
        .id
}

/// Invoice of `total` due in 30 days.
async fn invoice_for(engine: &Engine, student_id: Uuid, total: i64) -> Invoice {
    engine
        .create_invoice(
            CreateInvoiceCmd::new(student_id, CLERK, today(), today() + Duration::days(30))
                .line_item("Tuition", total, 1),
        )
        .await
        .unwrap()
}

fn payment(invoice_id: Uuid, amount_minor: i64) -> RecordPaymentCmd {
    RecordPaymentCmd::new(
        invoice_id,
        CLERK,
        amount_minor,
        PaymentMethod::BankTransfer,
        Utc::now(),
    )
    .reference("bank-ref")
}

async fn school(engine: &Engine) -> SchoolFinance {
    engine.school_finance(ADMIN).await.unwrap()
}

async fn student_finance(engine: &Engine, student_id: Uuid) -> StudentFinance {
    engine.student_finance(student_id, ADMIN).await.unwrap()
}

/// Both balance identities and the replay property.
async fn assert_consistent(engine: &Engine) {
    let school = school(engine).await;
    assert_eq!(
        school.balance_minor,
        school.total_income_minor - school.total_expenses_minor
    );

    let replayed = engine.replay_finances(ADMIN).await.unwrap();
    assert_eq!(replayed.school, school);
    for expected in &replayed.students {
        let actual = student_finance(engine, expected.student_id).await;
        assert_eq!(
            actual.balance_minor,
            actual.total_paid_minor - actual.total_due_minor
        );
        assert_eq!(&actual, expected);
    }
}

#[tokio::test]
async fn create_invoice_books_total_on_both_aggregates() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let invoice = engine
        .create_invoice(
            CreateInvoiceCmd::new(student_id, CLERK, today(), today() + Duration::days(30))
                .line_item("Tuition", 400, 2)
                .line_item("Books", 200, 1),
        )
        .await
        .unwrap();

    assert_eq!(invoice.total_minor, 1000);
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.line_items.len(), 2);
    assert_eq!(
        invoice.invoice_number,
        format!("INV-{}-001", Utc::now().year())
    );

    let finance = student_finance(&engine, student_id).await;
    assert_eq!(finance.total_due_minor, 1000);
    assert_eq!(finance.total_paid_minor, 0);
    assert_eq!(finance.balance_minor, -1000);

    let school = school(&engine).await;
    assert_eq!(school.total_income_minor, 1000);
    assert_eq!(school.balance_minor, 1000);

    let stored = engine.invoice(invoice.id, VIEWER).await.unwrap();
    assert_eq!(stored.invoice_number, invoice.invoice_number);
    assert_eq!(stored.total_minor, 1000);
    assert_eq!(stored.line_items, invoice.line_items);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn invoice_numbers_are_sequential() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let first = invoice_for(&engine, student_id, 100).await;
    let second = invoice_for(&engine, student_id, 100).await;

    let year = Utc::now().year();
    assert_eq!(first.invoice_number, format!("INV-{year}-001"));
    assert_eq!(second.invoice_number, format!("INV-{year}-002"));
}

#[tokio::test]
async fn invalid_invoices_write_nothing() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let err = engine
        .create_invoice(CreateInvoiceCmd::new(
            student_id,
            CLERK,
            today(),
            today(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .create_invoice(
            CreateInvoiceCmd::new(student_id, CLERK, today(), today() - Duration::days(1))
                .line_item("Tuition", 100, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .create_invoice(
            CreateInvoiceCmd::new(Uuid::new_v4(), CLERK, today(), today())
                .line_item("Tuition", 100, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("student not exists".to_string()));

    let invoices = engine
        .list_invoices(ADMIN, &InvoiceListFilter::default())
        .await
        .unwrap();
    assert!(invoices.is_empty());
    assert_eq!(school(&engine).await, SchoolFinance::default());
}

#[tokio::test]
async fn partial_payment_keeps_invoice_pending() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    let tx = engine.record_payment(payment(invoice.id, 400)).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.kind, TransactionKind::Income);
    assert_eq!(tx.category, engine::TUITION_PAYMENT);
    assert_eq!(tx.amount_minor, 400);
    assert_eq!(tx.invoice_id, Some(invoice.id));
    assert_eq!(tx.student_id, Some(student_id));
    assert_eq!(tx.reference.as_deref(), Some("bank-ref"));

    let invoice = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.paid_minor, 400);

    let finance = student_finance(&engine, student_id).await;
    assert_eq!(finance.total_paid_minor, 400);
    assert_eq!(finance.total_due_minor, 600);
    assert_eq!(finance.balance_minor, -200);

    let school = school(&engine).await;
    assert_eq!(school.total_income_minor, 1400);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn full_payment_marks_paid_and_rejects_overpayment() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    engine.record_payment(payment(invoice.id, 400)).await.unwrap();
    engine.record_payment(payment(invoice.id, 600)).await.unwrap();
    let paid = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);

    let before = school(&engine).await;
    let err = engine
        .record_payment(payment(invoice.id, 1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::OverpaymentRejected {
            invoice_id: invoice.id,
            total_minor: 1000,
            paid_minor: 1000,
            attempted_minor: 1,
        }
    );
    assert_eq!(err.kind(), ErrorKind::OverpaymentRejected);

    assert_eq!(school(&engine).await, before);
    let payments = engine
        .list_transactions(
            ADMIN,
            &TransactionListFilter {
                invoice_id: Some(invoice.id),
                ..TransactionListFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(payments.len(), 2);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn non_positive_payment_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    for amount in [0, -50] {
        let err = engine
            .record_payment(payment(invoice.id, amount))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let err = engine
        .record_payment(payment(Uuid::new_v4(), 10))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn past_due_invoice_reads_as_overdue_until_refreshed() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = engine
        .create_invoice(
            CreateInvoiceCmd::new(
                student_id,
                CLERK,
                today() - Duration::days(60),
                today() - Duration::days(30),
            )
            .line_item("Tuition", 1000, 1),
        )
        .await
        .unwrap();
    engine.record_payment(payment(invoice.id, 300)).await.unwrap();

    let read = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(read.status, InvoiceStatus::Overdue);

    let overdue = engine
        .list_invoices(
            ADMIN,
            &InvoiceListFilter {
                status: Some(InvoiceStatus::Overdue),
                ..InvoiceListFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);

    // The payment already persisted the derived status.
    assert_eq!(engine.refresh_invoice_statuses(ADMIN).await.unwrap(), 0);
}

#[tokio::test]
async fn refresh_persists_stale_statuses_once() {
    let (engine, db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "UPDATE invoices SET due_date = ? WHERE id = ?",
        vec![
            (today() - Duration::days(3)).into(),
            invoice.id.to_string().into(),
        ],
    ))
    .await
    .unwrap();

    assert_eq!(engine.refresh_invoice_statuses(ADMIN).await.unwrap(), 1);
    assert_eq!(engine.refresh_invoice_statuses(ADMIN).await.unwrap(), 0);
    let read = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(read.status, InvoiceStatus::Overdue);
}

#[tokio::test]
async fn cancelled_invoice_stays_cancelled() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    let cancelled = engine
        .update_invoice_status(invoice.id, InvoiceStatus::Cancelled, CLERK)
        .await
        .unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    engine.record_payment(payment(invoice.id, 1000)).await.unwrap();
    let read = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(read.status, InvoiceStatus::Cancelled);
    assert_eq!(read.paid_minor, 1000);

    let err = engine
        .update_invoice_status(invoice.id, InvoiceStatus::Pending, CLERK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // Cancelling again is a no-op.
    engine
        .update_invoice_status(invoice.id, InvoiceStatus::Cancelled, CLERK)
        .await
        .unwrap();
    assert_eq!(engine.refresh_invoice_statuses(ADMIN).await.unwrap(), 0);
}

#[tokio::test]
async fn requested_status_other_than_cancelled_is_derived() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    let read = engine
        .update_invoice_status(invoice.id, InvoiceStatus::Paid, CLERK)
        .await
        .unwrap();
    assert_eq!(read.status, InvoiceStatus::Pending);
}

#[tokio::test]
async fn direct_payment_moves_student_and_school() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let tx = engine
        .create_direct_payment(
            DirectPaymentCmd::new(student_id, CLERK, 300, PaymentMethod::Cash, Utc::now())
                .description("Uniform"),
        )
        .await
        .unwrap();
    assert_eq!(tx.category, engine::DIRECT_PAYMENT);
    assert_eq!(tx.invoice_id, None);

    let finance = student_finance(&engine, student_id).await;
    assert_eq!(finance.total_paid_minor, 300);
    assert_eq!(finance.total_due_minor, -300);
    assert_eq!(finance.balance_minor, 600);
    assert_eq!(school(&engine).await.total_income_minor, 300);
    assert_consistent(&engine).await;

    let err = engine
        .create_direct_payment(DirectPaymentCmd::new(
            Uuid::new_v4(),
            CLERK,
            300,
            PaymentMethod::Cash,
            Utc::now(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn deleting_a_payment_undoes_it() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    let school_before = school(&engine).await;
    let student_before = student_finance(&engine, student_id).await;

    let tx = engine.record_payment(payment(invoice.id, 1000)).await.unwrap();
    assert_eq!(
        engine.invoice(invoice.id, ADMIN).await.unwrap().status,
        InvoiceStatus::Paid
    );

    engine.delete_payment(tx.id, CLERK).await.unwrap();

    assert_eq!(school(&engine).await, school_before);
    assert_eq!(student_finance(&engine, student_id).await, student_before);
    let read = engine.invoice(invoice.id, ADMIN).await.unwrap();
    assert_eq!(read.status, InvoiceStatus::Pending);
    assert_eq!(read.paid_minor, 0);

    let err = engine.transaction(tx.id, ADMIN).await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("transaction not exists".to_string()));
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn deleting_a_pending_entry_has_no_aggregate_effect() {
    let (engine, _db) = engine_with_db().await;

    let tx = engine
        .record_transaction(
            RecordTransactionCmd::new(TransactionKind::Income, "DONATION", 500, CLERK, Utc::now())
                .status(TransactionStatus::Pending),
        )
        .await
        .unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());

    engine.delete_transaction(tx.id, CLERK).await.unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());
}

#[tokio::test]
async fn payment_endpoints_do_not_touch_expenses() {
    let (engine, _db) = engine_with_db().await;
    let expense = engine
        .record_expense(RecordExpenseCmd::new(CLERK, "Chalk", 50, "Supplies", Utc::now()))
        .await
        .unwrap();

    let err = engine.delete_payment(expense.id, CLERK).await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("payment not exists".to_string()));
    let err = engine
        .update_payment_status(expense.id, TransactionStatus::Failed, CLERK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(school(&engine).await.total_expenses_minor, 50);
}

#[tokio::test]
async fn status_changes_apply_only_completed_deltas() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let tx = engine
        .create_direct_payment(DirectPaymentCmd::new(
            student_id,
            CLERK,
            300,
            PaymentMethod::MobileMoney,
            Utc::now(),
        ))
        .await
        .unwrap();

    engine
        .update_payment_status(tx.id, TransactionStatus::Pending, CLERK)
        .await
        .unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());
    assert_eq!(student_finance(&engine, student_id).await.total_paid_minor, 0);

    // Same status and non-completed to non-completed leave totals alone.
    engine
        .update_payment_status(tx.id, TransactionStatus::Pending, CLERK)
        .await
        .unwrap();
    engine
        .update_payment_status(tx.id, TransactionStatus::Failed, CLERK)
        .await
        .unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());

    let updated = engine
        .update_payment_status(tx.id, TransactionStatus::Completed, CLERK)
        .await
        .unwrap();
    assert_eq!(updated.status, TransactionStatus::Completed);
    assert_eq!(school(&engine).await.total_income_minor, 300);
    assert_eq!(student_finance(&engine, student_id).await.total_paid_minor, 300);

    engine
        .update_payment_status(tx.id, TransactionStatus::Completed, CLERK)
        .await
        .unwrap();
    assert_eq!(school(&engine).await.total_income_minor, 300);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn completing_a_pending_payment_is_guarded() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;

    let pending = engine
        .record_transaction(
            RecordTransactionCmd::new(
                TransactionKind::Income,
                engine::TUITION_PAYMENT,
                800,
                CLERK,
                Utc::now(),
            )
            .status(TransactionStatus::Pending)
            .invoice(invoice.id),
        )
        .await
        .unwrap();
    assert_eq!(pending.student_id, Some(student_id));

    engine.record_payment(payment(invoice.id, 400)).await.unwrap();

    let err = engine
        .update_payment_status(pending.id, TransactionStatus::Completed, CLERK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverpaymentRejected);
    let read = engine.transaction(pending.id, ADMIN).await.unwrap();
    assert_eq!(read.status, TransactionStatus::Pending);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn expense_with_new_vendor_and_amount_update() {
    let (engine, _db) = engine_with_db().await;

    let expense = engine
        .record_expense(
            RecordExpenseCmd::new(CLERK, "Paper", 250, "Supplies", Utc::now())
                .vendor("Acme Co")
                .payment_method(PaymentMethod::Card)
                .receipt_url("https://receipts.example/1"),
        )
        .await
        .unwrap();
    assert_eq!(expense.kind, TransactionKind::Expense);

    let vendors = engine.vendors(ADMIN).await.unwrap();
    assert_eq!(vendors.len(), 1);
    assert_eq!(vendors[0].name, "Acme Co");
    assert_eq!(vendors[0].category.as_deref(), Some("Supplies"));
    assert_eq!(expense.vendor_id, Some(vendors[0].id));

    let school_after_expense = school(&engine).await;
    assert_eq!(school_after_expense.total_expenses_minor, 250);
    assert_eq!(school_after_expense.balance_minor, -250);

    let updated = engine
        .update_expense(UpdateExpenseCmd::new(expense.id, CLERK).amount_minor(300))
        .await
        .unwrap();
    assert_eq!(updated.amount_minor, 300);
    assert_eq!(updated.category, "Supplies");

    let school_after_update = school(&engine).await;
    assert_eq!(school_after_update.total_expenses_minor, 300);
    assert_eq!(
        school_after_update.balance_minor,
        school_after_expense.balance_minor - 50
    );
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn vendors_match_by_exact_name() {
    let (engine, _db) = engine_with_db().await;

    for name in ["Acme Co", "Acme Co", "acme co"] {
        engine
            .record_expense(
                RecordExpenseCmd::new(CLERK, "Paper", 10, "Supplies", Utc::now()).vendor(name),
            )
            .await
            .unwrap();
    }
    assert_eq!(engine.vendors(ADMIN).await.unwrap().len(), 2);
}

#[tokio::test]
async fn pending_expense_counts_once_completed() {
    let (engine, _db) = engine_with_db().await;

    let expense = engine
        .record_expense(
            RecordExpenseCmd::new(CLERK, "Repairs", 700, "Maintenance", Utc::now())
                .status(TransactionStatus::Pending),
        )
        .await
        .unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());

    // Amount edits on a pending expense move nothing.
    engine
        .update_expense(UpdateExpenseCmd::new(expense.id, CLERK).amount_minor(650))
        .await
        .unwrap();
    assert_eq!(school(&engine).await, SchoolFinance::default());

    engine
        .update_transaction_status(expense.id, TransactionStatus::Completed, CLERK)
        .await
        .unwrap();
    let school = school(&engine).await;
    assert_eq!(school.total_expenses_minor, 650);
    assert_eq!(school.balance_minor, -650);

    engine.delete_expense(expense.id, CLERK).await.unwrap();
    assert_eq!(engine.school_finance(ADMIN).await.unwrap(), SchoolFinance::default());
}

#[tokio::test]
async fn invalid_expenses_are_rejected() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .record_expense(RecordExpenseCmd::new(CLERK, "Paper", 0, "Supplies", Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .record_expense(RecordExpenseCmd::new(CLERK, " ", 10, "Supplies", Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .update_expense(UpdateExpenseCmd::new(Uuid::new_v4(), CLERK).amount_minor(10))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_never_overpay() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("bursar.db").display());
    let (engine, _db) = engine_on(&url, 20).await;
    let engine = Arc::new(engine);
    let student_id = new_student(&engine).await;
    let invoice_id = invoice_for(&engine, student_id, 1000).await.id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.record_payment(payment(invoice_id, 200)).await })
        })
        .collect();
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::OverpaymentRejected),
        }
    }
    assert_eq!(accepted, 5);

    let read = engine.invoice(invoice_id, ADMIN).await.unwrap();
    assert_eq!(read.paid_minor, 1000);
    assert_eq!(read.status, InvoiceStatus::Paid);
    assert_eq!(student_finance(&engine, student_id).await.total_paid_minor, 1000);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn invoice_payment_credits_only_the_invoiced_student() {
    let (engine, _db) = engine_with_db().await;
    let billed = new_student(&engine).await;
    let other = new_student(&engine).await;
    let invoice = invoice_for(&engine, billed, 1000).await;

    let entry = |student_id| {
        RecordTransactionCmd::new(
            TransactionKind::Income,
            engine::TUITION_PAYMENT,
            400,
            CLERK,
            Utc::now(),
        )
        .invoice(invoice.id)
        .student(student_id)
    };

    let err = engine.record_transaction(entry(other)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.invoice(invoice.id, ADMIN).await.unwrap().paid_minor, 0);
    assert_eq!(student_finance(&engine, other).await.total_paid_minor, 0);

    let tx = engine.record_transaction(entry(billed)).await.unwrap();
    assert_eq!(tx.student_id, Some(billed));
    let finance = student_finance(&engine, billed).await;
    assert_eq!(finance.total_paid_minor, 400);
    assert_eq!(finance.total_due_minor, 600);
    assert_eq!(engine.invoice(invoice.id, ADMIN).await.unwrap().paid_minor, 400);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn oversized_amounts_are_rejected_without_writes() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let err = engine
        .create_direct_payment(DirectPaymentCmd::new(
            student_id,
            CLERK,
            5_000_000_000_000_000_000,
            PaymentMethod::Cash,
            Utc::now(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(student_finance(&engine, student_id).await.total_paid_minor, 0);

    let err = engine
        .create_invoice(
            CreateInvoiceCmd::new(student_id, CLERK, today(), today() + Duration::days(30))
                .line_item("Tuition", engine::MAX_AMOUNT_MINOR, 2),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(school(&engine).await, SchoolFinance::default());

    engine
        .create_direct_payment(DirectPaymentCmd::new(
            student_id,
            CLERK,
            engine::MAX_AMOUNT_MINOR,
            PaymentMethod::Cash,
            Utc::now(),
        ))
        .await
        .unwrap();
    let finance = student_finance(&engine, student_id).await;
    assert_eq!(finance.balance_minor, 2 * engine::MAX_AMOUNT_MINOR);
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn unauthorized_callers_cannot_mutate() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;

    let err = engine
        .create_invoice(
            CreateInvoiceCmd::new(student_id, VIEWER, today(), today())
                .line_item("Tuition", 100, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = engine
        .record_expense(RecordExpenseCmd::new("mallory", "Paper", 10, "Supplies", Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = engine.school_finance("mallory").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert_eq!(school(&engine).await, SchoolFinance::default());
    assert!(engine.vendors(VIEWER).await.unwrap().is_empty());
}

#[tokio::test]
async fn authenticate_checks_password() {
    let (engine, _db) = engine_with_db().await;

    assert_eq!(
        engine.authenticate(CLERK, "password").await.unwrap(),
        UserRole::Accountant
    );
    let err = engine.authenticate(CLERK, "wrong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // Existing users are left untouched.
    engine
        .ensure_user(CLERK, "other", UserRole::Viewer)
        .await
        .unwrap();
    assert_eq!(
        engine.authenticate(CLERK, "password").await.unwrap(),
        UserRole::Accountant
    );
}

#[tokio::test]
async fn recompute_repairs_drifted_aggregates() {
    let (engine, db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;
    engine.record_payment(payment(invoice.id, 400)).await.unwrap();
    engine
        .record_expense(RecordExpenseCmd::new(CLERK, "Paper", 250, "Supplies", Utc::now()))
        .await
        .unwrap();
    let expected = engine.replay_finances(ADMIN).await.unwrap();

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "UPDATE school_finance SET balance = 0, total_income = 7".to_string(),
    ))
    .await
    .unwrap();
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DELETE FROM student_finances".to_string(),
    ))
    .await
    .unwrap();

    let err = engine.recompute_finances(VIEWER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let repaired = engine.recompute_finances(ADMIN).await.unwrap();
    assert_eq!(repaired, expected);
    assert_eq!(school(&engine).await, expected.school);
    assert_eq!(
        student_finance(&engine, student_id).await,
        expected.students[0]
    );
    assert_consistent(&engine).await;
}

#[tokio::test]
async fn transactions_list_filters() {
    let (engine, _db) = engine_with_db().await;
    let student_id = new_student(&engine).await;
    let invoice = invoice_for(&engine, student_id, 1000).await;
    engine.record_payment(payment(invoice.id, 100)).await.unwrap();
    engine
        .record_expense(RecordExpenseCmd::new(CLERK, "Paper", 250, "Supplies", Utc::now()))
        .await
        .unwrap();

    let expenses = engine
        .list_transactions(
            VIEWER,
            &TransactionListFilter {
                kind: Some(TransactionKind::Expense),
                ..TransactionListFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(expenses.len(), 1);

    let by_student = engine
        .list_transactions(
            VIEWER,
            &TransactionListFilter {
                student_id: Some(student_id),
                status: Some(TransactionStatus::Completed),
                ..TransactionListFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_student.len(), 1);

    let future = engine
        .list_transactions(
            VIEWER,
            &TransactionListFilter {
                from: Some(Utc::now() + Duration::days(1)),
                ..TransactionListFilter::default()
            },
        )
        .await
        .unwrap();
    assert!(future.is_empty());
}
