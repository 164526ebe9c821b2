    use super::*;

    #[test]
    fn test_counters_new() {
        let counters = InstallerCounters::new();
        assert_eq!(counters.tasks_completed.load(Ordering::SeqCst), 0);
        assert!(!counters.is_idle());
    }

    #[test]
    fn test_record_operation_returns_total() {
        let counters = InstallerCounters::new();
        assert_eq!(counters.record_operation(), 1);
        assert_eq!(counters.record_operation(), 2);
    }

    #[test]
    fn test_idle_counts_transitions_only() {
        let counters = InstallerCounters::new();
        assert!(counters.mark_idle());
        assert!(!counters.mark_idle());
        assert_eq!(counters.idle_transitions.load(Ordering::SeqCst), 1);

        counters.mark_busy();
        assert!(!counters.is_idle());
        assert!(counters.mark_idle());
        assert_eq!(counters.idle_transitions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_snapshot() {
        let counters = InstallerCounters::new();
        counters.record_task_completed();
        counters.record_task_completed();
        counters.record_registration();
        counters.record_task_deferred();
        counters.record_cycle();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.tasks_completed, 2);
        assert_eq!(snapshot.registrations, 1);
        assert_eq!(snapshot.tasks_deferred, 1);
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.tasks_failed, 0);
        assert!(!snapshot.is_idle);
    }

    #[test]
    fn test_settle_never_moves_backwards() {
        let counters = InstallerCounters::new();
        counters.settle(3);
        counters.settle(1);
        assert_eq!(counters.settled_registrations.load(Ordering::SeqCst), 3);

        counters.mark_idle();
        let snapshot = counters.snapshot();
        assert!(snapshot.is_settled(3));
        assert!(!snapshot.is_settled(4));
    }
