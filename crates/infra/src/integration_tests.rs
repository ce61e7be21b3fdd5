//! Integration tests for the full billing pipeline.
//!
//! Tests: engine → store transaction → generation / allocation → settlement
//!
//! Verifies:
//! - First invoices are prorated, later ones are not
//! - Invoice numbers form independent increasing sequences per category
//! - The recurring run is idempotent per month
//! - Payments settle and reopen invoices with exact counter bookkeeping
//! - Failed operations leave no partial writes

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use cyclebill_catalog::Service;
    use cyclebill_core::{
        BillingError, BillingMonth, CustomerId, InvoiceId, MoneyRounding, ServiceCategory, ServiceId, SubscriptionId,
    };
    use cyclebill_customers::{Customer, Subscription};
    use cyclebill_invoicing::{Invoice, InvoiceLine, InvoiceStatus, IssueInvoice};
    use cyclebill_payments::{NewPayment, PaymentChannel, PaymentLeg, Tender};

    use crate::clock::FixedClock;
    use crate::config::BillingConfig;
    use crate::engine::BillingEngine;
    use crate::store::{BillingStore, CustomerRepository, InMemoryBillingStore, InvoiceRepository, ServiceRepository};

    type Engine = BillingEngine<Arc<InMemoryBillingStore>>;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(y: i32, m: u32) -> BillingMonth {
        BillingMonth::new(y, m).unwrap()
    }

    fn internet(price: Decimal) -> Service {
        Service::new(ServiceId::new(), "Fiber 100", ServiceCategory::Internet, price).unwrap()
    }

    fn streaming(price: Decimal) -> Service {
        Service::new(ServiceId::new(), "Screens", ServiceCategory::Streaming, price).unwrap()
    }

    fn subscribe(customer: &Customer, service: &Service, quantity: u32) -> Subscription {
        Subscription::new(
            SubscriptionId::new(),
            customer.id_typed(),
            service.id_typed(),
            quantity,
            customer.enrolled_on(),
        )
        .unwrap()
    }

    fn setup(today: NaiveDate) -> (Engine, Arc<FixedClock>) {
        let config = BillingConfig {
            default_exchange_rate: dec!(36.6),
            log_level: "cyclebill_infra=debug".to_string(),
            ..BillingConfig::default()
        };
        cyclebill_observability::init_with_default(&config.log_level);
        let store = Arc::new(InMemoryBillingStore::new());
        let clock = Arc::new(FixedClock::on(today));
        let engine = BillingEngine::new(store, config).unwrap().with_clock(clock.clone());
        (engine, clock)
    }

    fn add_customer(engine: &Engine, name: &str, enrolled_on: NaiveDate) -> Customer {
        let customer = Customer::new(CustomerId::new(), name, enrolled_on);
        let saved = customer.clone();
        engine.store().transaction(|tx| tx.save_customer(saved)).unwrap();
        customer
    }

    fn add_service(engine: &Engine, service: Service) -> Service {
        let saved = service.clone();
        engine.store().transaction(|tx| tx.save_service(saved)).unwrap();
        service
    }

    fn add_subscription(engine: &Engine, subscription: Subscription) {
        engine.store().transaction(|tx| tx.save_subscription(subscription)).unwrap();
    }

    fn customer(engine: &Engine, id: CustomerId) -> Customer {
        engine.store().read(|tx| tx.get_customer(id)).unwrap().unwrap()
    }

    fn invoice(engine: &Engine, id: InvoiceId) -> Invoice {
        engine.store().read(|tx| tx.get_invoice(id)).unwrap().unwrap()
    }

    fn invoices_of(engine: &Engine, id: CustomerId) -> Vec<Invoice> {
        engine.store().read(|tx| tx.invoices_for_customer(id)).unwrap()
    }

    fn cash(amount: Decimal) -> NewPayment {
        NewPayment::new(Tender::physical(PaymentLeg::local(amount)))
    }

    /// Issue a single full-price Internet invoice for `m`.
    fn billed(engine: &Engine, customer: &Customer, service: &Service, m: BillingMonth) -> Invoice {
        let report = engine
            .generate_invoice(customer.id_typed(), &[service.id_typed()], m)
            .unwrap();
        report.invoices.into_iter().next().unwrap()
    }

    /// Store an invoice with a hand-picked number for a customer outside the run.
    fn seed_invoice(engine: &Engine, number: &str, service: &Service, m: BillingMonth) {
        let line = InvoiceLine {
            service_id: service.id_typed(),
            quantity: 1,
            unit_price: service.unit_price(),
            amount: service.unit_price(),
            prorated: false,
        };
        let invoice = Invoice::issue(
            IssueInvoice {
                invoice_id: InvoiceId::new(),
                number: number.to_string(),
                customer_id: CustomerId::new(),
                category: service.category(),
                billing_month: m,
                lines: vec![line],
                issued_at: chrono::Utc::now(),
            },
            MoneyRounding::default(),
        )
        .unwrap();
        engine.store().transaction(|tx| tx.insert_invoice(invoice)).unwrap();
    }

    // ---- generation -------------------------------------------------------

    #[test]
    fn first_invoice_is_prorated_and_later_ones_are_not() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana Perez", date(2024, 11, 13));
        let fiber = add_service(&engine, internet(dec!(600.00)));

        let first = billed(&engine, &ana, &fiber, month(2024, 11));
        assert_eq!(first.amount(), dec!(460.00));
        assert!(first.lines()[0].prorated);
        assert_eq!(first.number(), "0179-AnaPerez-112024");

        let second = billed(&engine, &ana, &fiber, month(2024, 12));
        assert_eq!(second.amount(), dec!(600.00));
        assert_eq!(second.number(), "0180-AnaPerez-122024");
    }

    #[test]
    fn enrollment_on_or_before_anchor_day_bills_full_price() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let fiber = add_service(&engine, internet(dec!(600.00)));

        for day in 1..=5 {
            let customer = add_customer(&engine, "Early", date(2024, 11, day));
            let invoice = billed(&engine, &customer, &fiber, month(2024, 11));
            assert_eq!(invoice.amount(), dec!(600.00), "enrolled on day {day}");
        }
    }

    #[test]
    fn cancelled_invoice_still_counts_as_prior_invoice() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 11, 13));
        let fiber = add_service(&engine, internet(dec!(600.00)));

        let first = billed(&engine, &ana, &fiber, month(2024, 11));
        engine.cancel_invoice(first.id_typed()).unwrap();

        let again = billed(&engine, &ana, &fiber, month(2024, 11));
        assert_eq!(again.amount(), dec!(600.00));
        assert_ne!(again.number(), first.number());
    }

    #[test]
    fn categories_have_independent_sequences() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let fiber = add_service(&engine, internet(dec!(300)));
        let screens = add_service(&engine, streaming(dec!(4.50)));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let luis = add_customer(&engine, "Luis Alberto Gonzalez", date(2024, 1, 1));

        let report = engine
            .generate_invoice(ana.id_typed(), &[fiber.id_typed(), screens.id_typed()], month(2024, 11))
            .unwrap();
        let mut numbers: Vec<&str> = report.invoices.iter().map(Invoice::number).collect();
        numbers.sort();
        assert_eq!(numbers, vec!["0001-Ana-112024-S", "0179-Ana-112024"]);

        let report = engine
            .generate_invoice(luis.id_typed(), &[screens.id_typed(), fiber.id_typed()], month(2024, 11))
            .unwrap();
        let mut numbers: Vec<&str> = report.invoices.iter().map(Invoice::number).collect();
        numbers.sort();
        assert_eq!(numbers, vec!["0002-LuisAlbert-112024-S", "0180-LuisAlbert-112024"]);
    }

    #[test]
    fn streaming_bills_quantity_from_subscription() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 11, 20));
        let screens = add_service(&engine, streaming(dec!(4.50)));
        add_subscription(&engine, subscribe(&ana, &screens, 3));

        let invoice = billed(&engine, &ana, &screens, month(2024, 11));
        assert_eq!(invoice.category(), ServiceCategory::Streaming);
        assert_eq!(invoice.amount(), dec!(13.50));
    }

    #[test]
    fn manual_duplicate_is_reported() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let fiber = add_service(&engine, internet(dec!(300)));
        let screens = add_service(&engine, streaming(dec!(5)));
        billed(&engine, &ana, &fiber, month(2024, 11));

        let err = engine
            .generate_invoice(ana.id_typed(), &[fiber.id_typed()], month(2024, 11))
            .unwrap_err();
        assert!(err.is_duplicate());

        // A new category still goes through; the duplicate shows up as a skip.
        let report = engine
            .generate_invoice(ana.id_typed(), &[fiber.id_typed(), screens.id_typed()], month(2024, 11))
            .unwrap();
        assert_eq!(report.invoices.len(), 1);
        assert_eq!(report.invoices[0].category(), ServiceCategory::Streaming);
        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.skipped[0].category, ServiceCategory::Internet);
    }

    #[test]
    fn manual_generation_validates_inputs() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let mut old = internet(dec!(100));
        old.deactivate();
        let old = add_service(&engine, old);

        let err = engine.generate_invoice(CustomerId::new(), &[old.id_typed()], month(2024, 11)).unwrap_err();
        assert!(matches!(err, BillingError::CustomerNotFound(_)));

        let err = engine.generate_invoice(ana.id_typed(), &[], month(2024, 11)).unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        let err = engine.generate_invoice(ana.id_typed(), &[old.id_typed()], month(2024, 11)).unwrap_err();
        assert_eq!(err, BillingError::ServiceNotFoundOrInactive(old.id_typed()));
        assert!(invoices_of(&engine, ana.id_typed()).is_empty());
    }

    // ---- recurring run ----------------------------------------------------

    #[test]
    fn recurring_run_bills_previous_month_once() {
        let (engine, _clock) = setup(date(2024, 12, 3));
        let fiber = add_service(&engine, internet(dec!(600.00)));
        let screens = add_service(&engine, streaming(dec!(4.50)));

        let ana = add_customer(&engine, "Ana", date(2024, 11, 13));
        add_subscription(&engine, subscribe(&ana, &fiber, 1));
        add_subscription(&engine, subscribe(&ana, &screens, 2));
        let luis = add_customer(&engine, "Luis", date(2024, 6, 1));
        add_subscription(&engine, subscribe(&luis, &fiber, 1));

        let report = engine.run_recurring_billing_report().unwrap();
        assert_eq!(report.billing_month, month(2024, 11));
        assert_eq!(report.customers_considered, 2);
        assert_eq!(report.invoices_created, 3);
        assert!(report.failures.is_empty());

        let ana_invoices = invoices_of(&engine, ana.id_typed());
        let ana_internet = ana_invoices
            .iter()
            .find(|i| i.category() == ServiceCategory::Internet)
            .unwrap();
        assert_eq!(ana_internet.amount(), dec!(460.00));

        assert_eq!(engine.run_recurring_billing().unwrap(), 0);
        let again = engine.run_recurring_billing_report().unwrap();
        assert_eq!(again.duplicates_skipped, 3);
        assert_eq!(invoices_of(&engine, ana.id_typed()).len(), 2);
    }

    #[test]
    fn recurring_run_follows_the_clock() {
        let (engine, clock) = setup(date(2024, 12, 3));
        let fiber = add_service(&engine, internet(dec!(100)));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&ana, &fiber, 1));

        assert_eq!(engine.run_recurring_billing().unwrap(), 1);
        clock.advance(chrono::Duration::days(31));
        assert_eq!(engine.run_recurring_billing().unwrap(), 1);

        let mut months: Vec<BillingMonth> = invoices_of(&engine, ana.id_typed())
            .iter()
            .map(Invoice::billing_month)
            .collect();
        months.sort();
        assert_eq!(months, vec![month(2024, 11), month(2024, 12)]);
    }

    #[test]
    fn recurring_run_skips_inactive_and_deduplicates() {
        let (engine, _clock) = setup(date(2024, 12, 3));
        let fiber = add_service(&engine, internet(dec!(100)));
        let mut retired = streaming(dec!(5));
        retired.deactivate();
        let retired = add_service(&engine, retired);

        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&ana, &fiber, 1));
        add_subscription(&engine, subscribe(&ana, &fiber, 1));
        add_subscription(&engine, subscribe(&ana, &retired, 4));

        let mut gone = add_customer(&engine, "Gone", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&gone, &fiber, 1));
        gone.deactivate();
        engine.store().transaction(|tx| tx.save_customer(gone.clone())).unwrap();

        let only_retired = add_customer(&engine, "Retired", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&only_retired, &retired, 1));

        let report = engine.run_recurring_billing_report().unwrap();
        assert_eq!(report.customers_considered, 2);
        assert_eq!(report.invoices_created, 1);

        let ana_invoices = invoices_of(&engine, ana.id_typed());
        assert_eq!(ana_invoices.len(), 1);
        assert_eq!(ana_invoices[0].lines().len(), 1);
        assert!(invoices_of(&engine, gone.id_typed()).is_empty());
        assert!(invoices_of(&engine, only_retired.id_typed()).is_empty());
    }

    #[test]
    fn recurring_run_reports_failed_categories_and_bills_the_rest() {
        let (engine, _clock) = setup(date(2024, 12, 3));
        let fiber = add_service(&engine, internet(dec!(100)));
        let screens = add_service(&engine, streaming(dec!(5)));
        seed_invoice(&engine, "4294967295-X-102024-S", &screens, month(2024, 10));

        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&ana, &screens, 1));
        let luis = add_customer(&engine, "Luis", date(2024, 1, 1));
        add_subscription(&engine, subscribe(&luis, &fiber, 1));

        let report = engine.run_recurring_billing_report().unwrap();
        assert_eq!(report.customers_considered, 2);
        assert_eq!(report.invoices_created, 1);
        assert_eq!(report.duplicates_skipped, 0);
        assert_eq!(report.failures.len(), 1);

        let failure = &report.failures[0];
        assert_eq!(failure.customer_id, ana.id_typed());
        assert_eq!(failure.category, Some(ServiceCategory::Streaming));
        match &failure.error {
            BillingError::Validation(msg) if msg.contains("sequence exhausted") => {}
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(invoices_of(&engine, ana.id_typed()).is_empty());
        let luis_invoices = invoices_of(&engine, luis.id_typed());
        assert_eq!(luis_invoices.len(), 1);
        assert_eq!(luis_invoices[0].number(), "0179-Luis-112024");
    }

    // ---- payments & settlement --------------------------------------------

    #[test]
    fn mixed_payment_total_uses_default_rate() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let tender = Tender::mixed(PaymentLeg::new(dec!(100), dec!(10)), PaymentLeg::local(dec!(50)));
        assert_eq!(engine.compute_payment_total(&tender).unwrap(), dec!(516.00));
    }

    #[test]
    fn full_payment_settles_and_deletion_reopens() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let fiber = add_service(&engine, internet(dec!(100)));
        let inv = billed(&engine, &ana, &fiber, month(2024, 11));

        let partial = engine.create_payment(cash(dec!(40)).for_invoice(inv.id_typed()), None, None).unwrap();
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Pending);
        assert_eq!(engine.get_outstanding_balance(inv.id_typed()).unwrap(), dec!(60.00));

        let rest = engine
            .create_payment(cash(dec!(60)).for_invoice(inv.id_typed()).with_received(dec!(100)), None, None)
            .unwrap();
        assert_eq!(rest.payment.change_due(), dec!(40.00));
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Paid);
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 1);

        // Overpaying an already paid invoice does not count twice.
        engine.create_payment(cash(dec!(5)).for_invoice(inv.id_typed()), None, None).unwrap();
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 1);

        assert!(engine.delete_payment(rest.payment.id_typed()).unwrap());
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Pending);
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 0);

        assert!(engine.delete_payment(partial.payment.id_typed()).unwrap());
        assert!(!engine.delete_payment(partial.payment.id_typed()).unwrap());
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 0);
    }

    #[test]
    fn payment_spread_proportionally_over_invoices() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let big = add_service(&engine, internet(dec!(100)));
        let small = add_service(&engine, streaming(dec!(50)));
        let first = billed(&engine, &ana, &big, month(2024, 11));
        let second = billed(&engine, &ana, &small, month(2024, 11));
        let ids = [first.id_typed(), second.id_typed()];

        let recorded = engine
            .create_payment(NewPayment::new(Tender::electronic(PaymentLeg::local(dec!(90)))), Some(&ids), None)
            .unwrap();
        let applied: Vec<Decimal> = recorded.links.iter().map(|l| l.applied_amount).collect();
        assert_eq!(applied, vec![dec!(60.00), dec!(30.00)]);
        assert_eq!(recorded.payment.invoice_id(), None);
        assert_eq!(recorded.payment.channel(), PaymentChannel::Electronic);

        assert_eq!(engine.get_outstanding_balance(first.id_typed()).unwrap(), dec!(40.00));
        assert_eq!(engine.get_outstanding_balance(second.id_typed()).unwrap(), dec!(20.00));

        // The remaining 60 settles both invoices at once.
        engine
            .create_payment(NewPayment::new(Tender::electronic(PaymentLeg::local(dec!(60)))), Some(&ids), None)
            .unwrap();
        assert_eq!(invoice(&engine, first.id_typed()).status(), InvoiceStatus::Paid);
        assert_eq!(invoice(&engine, second.id_typed()).status(), InvoiceStatus::Paid);
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 2);

        let err = engine
            .create_payment(NewPayment::new(Tender::electronic(PaymentLeg::local(dec!(10)))), Some(&ids), None)
            .unwrap_err();
        assert_eq!(err, BillingError::NoOutstandingBalance);
    }

    #[test]
    fn explicit_applied_amounts_are_checked_against_tolerance() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let first = billed(&engine, &ana, &add_service(&engine, internet(dec!(100))), month(2024, 11));
        let second = billed(&engine, &ana, &add_service(&engine, streaming(dec!(100))), month(2024, 11));
        let ids = [first.id_typed(), second.id_typed()];
        let payment = || NewPayment::new(Tender::electronic(PaymentLeg::local(dec!(100))));

        let err = engine
            .create_payment(payment(), Some(&ids), Some(&[dec!(60), dec!(41.01)]))
            .unwrap_err();
        assert!(matches!(err, BillingError::OverAllocation { .. }));

        let recorded = engine
            .create_payment(payment(), Some(&ids), Some(&[dec!(70), dec!(30)]))
            .unwrap();
        assert_eq!(recorded.links[0].applied_amount, dec!(70));
        assert_eq!(engine.get_outstanding_balance(first.id_typed()).unwrap(), dec!(30));

        // Mismatched length falls back to proportional derivation.
        let recorded = engine.create_payment(payment(), Some(&ids), Some(&[dec!(100)])).unwrap();
        let applied: Vec<Decimal> = recorded.links.iter().map(|l| l.applied_amount).collect();
        assert_eq!(applied, vec![dec!(30.00), dec!(70.00)]);
    }

    #[test]
    fn rejected_payments_leave_nothing_behind() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let luis = add_customer(&engine, "Luis", date(2024, 1, 1));
        let fiber = add_service(&engine, internet(dec!(100)));
        let a = billed(&engine, &ana, &fiber, month(2024, 11));
        let l = billed(&engine, &luis, &fiber, month(2024, 11));

        let err = engine
            .create_payment(cash(dec!(50)), Some(&[a.id_typed(), l.id_typed()]), None)
            .unwrap_err();
        assert_eq!(err, BillingError::CrossCustomerInvoiceMix);

        let err = engine
            .create_payment(cash(dec!(50)), Some(&[a.id_typed(), a.id_typed()]), None)
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        let missing = InvoiceId::new();
        let err = engine.create_payment(cash(dec!(50)), Some(&[a.id_typed(), missing]), None).unwrap_err();
        assert_eq!(err, BillingError::InvoiceNotFound(missing));

        let err = engine.create_payment(cash(dec!(50)), None, None).unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        assert_eq!(engine.get_outstanding_balance(a.id_typed()).unwrap(), dec!(100));
        assert_eq!(engine.get_outstanding_balance(l.id_typed()).unwrap(), dec!(100));
        engine.delete_invoice(a.id_typed()).unwrap();
    }

    #[test]
    fn cancelled_invoices_cannot_be_paid() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let inv = billed(&engine, &ana, &add_service(&engine, internet(dec!(100))), month(2024, 11));
        engine.cancel_invoice(inv.id_typed()).unwrap();

        let err = engine.create_payment(cash(dec!(100)).for_invoice(inv.id_typed()), None, None).unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn paid_invoice_cannot_be_cancelled() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let inv = billed(&engine, &ana, &add_service(&engine, internet(dec!(100))), month(2024, 11));
        engine.create_payment(cash(dec!(100)).for_invoice(inv.id_typed()), None, None).unwrap();

        let err = engine.cancel_invoice(inv.id_typed()).unwrap_err();
        assert!(matches!(err, BillingError::InvalidTransition(_)));
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Paid);
    }

    #[test]
    fn invoice_deletion_is_blocked_by_payments() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let fiber = add_service(&engine, internet(dec!(100)));
        let screens = add_service(&engine, streaming(dec!(50)));
        let direct = billed(&engine, &ana, &fiber, month(2024, 11));
        let linked = billed(&engine, &ana, &screens, month(2024, 11));

        let p1 = engine.create_payment(cash(dec!(10)).for_invoice(direct.id_typed()), None, None).unwrap();
        let p2 = engine
            .create_payment(cash(dec!(10)), Some(&[linked.id_typed()]), None)
            .unwrap();

        for id in [direct.id_typed(), linked.id_typed()] {
            let err = engine.delete_invoice(id).unwrap_err();
            assert_eq!(err, BillingError::InvoiceHasLinkedPayments(id));
        }

        let missing = cyclebill_core::PaymentId::new();
        let (deleted, not_found) = engine
            .delete_payments(&[p1.payment.id_typed(), p2.payment.id_typed(), missing])
            .unwrap();
        assert_eq!((deleted, not_found), (2, 1));

        engine.delete_invoice(direct.id_typed()).unwrap();
        engine.delete_invoice(linked.id_typed()).unwrap();
        assert!(invoices_of(&engine, ana.id_typed()).is_empty());
        assert_eq!(
            engine.delete_invoice(direct.id_typed()).unwrap_err(),
            BillingError::InvoiceNotFound(direct.id_typed())
        );
    }

    #[test]
    fn deleted_invoice_number_is_never_reissued() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let fiber = add_service(&engine, internet(dec!(100)));

        let november = billed(&engine, &ana, &fiber, month(2024, 11));
        assert_eq!(november.number(), "0179-Ana-112024");
        engine.delete_invoice(november.id_typed()).unwrap();

        let again = billed(&engine, &ana, &fiber, month(2024, 11));
        assert_eq!(again.number(), "0180-Ana-112024");
        let december = billed(&engine, &ana, &fiber, month(2024, 12));
        assert_eq!(december.number(), "0181-Ana-122024");
    }

    #[test]
    fn deleting_paid_zero_amount_invoice_gives_counter_back() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let ana = add_customer(&engine, "Ana", date(2024, 1, 1));
        let free = add_service(&engine, internet(dec!(0)));
        let inv = billed(&engine, &ana, &free, month(2024, 11));

        // A zero link is enough to run settlement on the free invoice.
        let paid = add_service(&engine, streaming(dec!(10)));
        let other = billed(&engine, &ana, &paid, month(2024, 11));
        let p = engine
            .create_payment(cash(dec!(10)), Some(&[other.id_typed(), inv.id_typed()]), Some(&[dec!(10), dec!(0)]))
            .unwrap();
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Paid);
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 2);

        assert!(engine.delete_payment(p.payment.id_typed()).unwrap());
        // Nothing paid still covers a zero amount.
        assert_eq!(invoice(&engine, inv.id_typed()).status(), InvoiceStatus::Paid);
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 1);

        engine.delete_invoice(inv.id_typed()).unwrap();
        assert_eq!(customer(&engine, ana.id_typed()).paid_invoice_count(), 0);
    }

    // ---- concurrency -------------------------------------------------------

    #[test]
    fn concurrent_generation_never_reuses_numbers() {
        let (engine, _clock) = setup(date(2024, 12, 1));
        let fiber = add_service(&engine, internet(dec!(100)));
        let customers: Vec<Customer> = (0..16)
            .map(|i| add_customer(&engine, &format!("Customer {i}"), date(2024, 1, 1)))
            .collect();

        std::thread::scope(|scope| {
            for customer in &customers {
                let engine = &engine;
                let fiber = &fiber;
                scope.spawn(move || {
                    engine
                        .generate_invoice(customer.id_typed(), &[fiber.id_typed()], month(2024, 11))
                        .unwrap();
                });
            }
        });

        let mut sequences: Vec<u32> = engine
            .store()
            .read(|tx| tx.invoice_numbers())
            .unwrap()
            .iter()
            .map(|n| n[..4].parse().unwrap())
            .collect();
        sequences.sort();
        assert_eq!(sequences, (179..195).collect::<Vec<u32>>());
    }
}
