//! Initial schema of the school ledger.
//!
//! - `users`: callers and their role
//! - `students`: who invoices and payments refer to
//! - `invoices` / `invoice_line_items`: billing documents
//! - `vendors`: expense counterparts
//! - `transactions`: the ledger, the only record of money movement
//! - `student_finances`: per-student running totals (cache)
//! - `school_finance`: the singleton school totals (cache)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    Password,
    Role,
}

#[derive(Iden)]
enum Students {
    Table,
    Id,
    FirstName,
    LastName,
    Grade,
}

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    InvoiceNumber,
    StudentId,
    TotalMinor,
    IssueDate,
    DueDate,
    Status,
    Version,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum InvoiceLineItems {
    Table,
    Id,
    InvoiceId,
    Position,
    Description,
    AmountMinor,
    Quantity,
}

#[derive(Iden)]
enum Vendors {
    Table,
    Id,
    Name,
    Category,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    Kind,
    Category,
    AmountMinor,
    OccurredAt,
    PaymentMethod,
    Status,
    Reference,
    Description,
    ReceiptUrl,
    InvoiceId,
    StudentId,
    VendorId,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum StudentFinances {
    Table,
    StudentId,
    TotalPaid,
    TotalDue,
    Balance,
}

#[derive(Iden)]
enum SchoolFinance {
    Table,
    Id,
    Balance,
    TotalIncome,
    TotalExpenses,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users and students
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string()
                            .not_null()
                            .default("VIEWER"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Students::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Students::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Students::FirstName).string().not_null())
                    .col(ColumnDef::new(Students::LastName).string().not_null())
                    .col(ColumnDef::new(Students::Grade).string())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Invoices
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoices::InvoiceNumber).string().not_null())
                    .col(ColumnDef::new(Invoices::StudentId).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::TotalMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Invoices::IssueDate).date().not_null())
                    .col(ColumnDef::new(Invoices::DueDate).date().not_null())
                    .col(
                        ColumnDef::new(Invoices::Status)
                            .string()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Invoices::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Invoices::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-student_id")
                            .from(Invoices::Table, Invoices::StudentId)
                            .to(Students::Table, Students::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-invoice_number-unique")
                    .table(Invoices::Table)
                    .col(Invoices::InvoiceNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-student_id")
                    .table(Invoices::Table)
                    .col(Invoices::StudentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-created_at")
                    .table(Invoices::Table)
                    .col(Invoices::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InvoiceLineItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceLineItems::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InvoiceLineItems::InvoiceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceLineItems::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceLineItems::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceLineItems::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceLineItems::Quantity)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoice_line_items-invoice_id")
                            .from(InvoiceLineItems::Table, InvoiceLineItems::InvoiceId)
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoice_line_items-invoice_id")
                    .table(InvoiceLineItems::Table)
                    .col(InvoiceLineItems::InvoiceId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Vendors
        // ───────────────────────────────────────────────────────────────────
        // `name` is not unique; two concurrent creates may duplicate a vendor.
        manager
            .create_table(
                Table::create()
                    .table(Vendors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vendors::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vendors::Name).string().not_null())
                    .col(ColumnDef::new(Vendors::Category).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-vendors-name")
                    .table(Vendors::Table)
                    .col(Vendors::Name)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Transactions
        // ───────────────────────────────────────────────────────────────────
        // Links to invoices, students and vendors are weak references.
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::Category).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::PaymentMethod)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(ColumnDef::new(Transactions::Reference).string())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::ReceiptUrl).string())
                    .col(ColumnDef::new(Transactions::InvoiceId).string())
                    .col(ColumnDef::new(Transactions::StudentId).string())
                    .col(ColumnDef::new(Transactions::VendorId).string())
                    .col(ColumnDef::new(Transactions::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-invoice_id")
                    .table(Transactions::Table)
                    .col(Transactions::InvoiceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-student_id")
                    .table(Transactions::Table)
                    .col(Transactions::StudentId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Aggregates
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(StudentFinances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StudentFinances::StudentId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StudentFinances::TotalPaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StudentFinances::TotalDue)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StudentFinances::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SchoolFinance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SchoolFinance::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SchoolFinance::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SchoolFinance::TotalIncome)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SchoolFinance::TotalExpenses)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SchoolFinance::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StudentFinances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vendors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InvoiceLineItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Students::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
