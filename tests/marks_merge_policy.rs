use schoold::marks::service::ScoreChange;
use schoold::marks::{
    dedup_first_per_exam_subject, is_reportable, merge_updates, MarkEntry, MarkUpdate,
    MarksObtainedPolicy, StudentScore,
};

fn entry(student: &str, t: f64, e: f64, mo: f64, comment: Option<&str>) -> MarkEntry {
    MarkEntry {
        id: format!("e-{student}"),
        subject_id: Some("sub".to_string()),
        student_id: student.to_string(),
        testscore: t,
        examscore: e,
        marks_obtained: mo,
        comment: comment.map(|c| c.to_string()),
    }
}

fn score(exam: &str, subject: &str, comment: &str) -> StudentScore {
    StudentScore {
        id: format!("{exam}-{subject}-{comment}"),
        exam_id: exam.to_string(),
        exam_name: exam.to_uppercase(),
        subject_id: subject.to_string(),
        subject_name: subject.to_uppercase(),
        student_id: "stu".to_string(),
        testscore: 1.0,
        examscore: 1.0,
        marks_obtained: 2.0,
        comment: comment.to_string(),
    }
}

#[test]
fn merge_touches_only_sent_fields_and_first_update_wins() {
    let mut entries = vec![
        entry("S1", 10.0, 20.0, 30.0, Some("ok")),
        entry("S2", 1.0, 2.0, 3.0, None),
    ];
    let updates = vec![
        MarkUpdate {
            student_id: Some("S1".into()),
            examscore: Some(25.0),
            ..Default::default()
        },
        MarkUpdate {
            student_id: Some("S1".into()),
            examscore: Some(99.0),
            comment: Some("ignored".into()),
            ..Default::default()
        },
        MarkUpdate {
            student_id: Some("S3".into()),
            testscore: Some(5.0),
            ..Default::default()
        },
    ];

    let merged = merge_updates(&mut entries, &updates);

    assert_eq!(merged, 1);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], entry("S1", 10.0, 25.0, 30.0, Some("ok")));
    assert_eq!(entries[1], entry("S2", 1.0, 2.0, 3.0, None));
}

#[test]
fn merge_with_no_updates_is_a_noop() {
    let mut entries = vec![entry("S1", 1.0, 1.0, 2.0, None)];
    let before = entries.clone();
    assert_eq!(merge_updates(&mut entries, &[]), 0);
    assert_eq!(entries, before);
}

#[test]
fn missing_required_reports_first_absent_field() {
    let mut u = MarkUpdate::default();
    assert_eq!(u.missing_required(), Some("studentId"));
    u.student_id = Some("S1".into());
    assert_eq!(u.missing_required(), Some("testscore"));
    u.testscore = Some(0.0);
    u.examscore = Some(0.0);
    assert_eq!(u.missing_required(), Some("marksObtained"));
    u.marks_obtained = Some(0.0);
    assert_eq!(u.missing_required(), None);

    let built = u.to_entry("id-1".into(), "sub-9").expect("complete update");
    assert_eq!(built.subject_id.as_deref(), Some("sub-9"));
    assert_eq!(built.comment, None);

    let change = ScoreChange::from_update(&u).expect("complete update");
    assert_eq!(change.student_id, "S1");
    assert_eq!(
        ScoreChange::from_update(&MarkUpdate::default()),
        Err("studentId")
    );
}

#[test]
fn marks_obtained_policy() {
    let e = entry("S1", 12.0, 18.0, 99.0, None);
    assert_eq!(MarksObtainedPolicy::Stored.resolve(&e), 99.0);
    assert_eq!(MarksObtainedPolicy::Derived.resolve(&e), 30.0);
}

#[test]
fn reportable_needs_a_score_and_a_comment() {
    assert!(is_reportable(&entry("S", 1.0, 0.0, 1.0, Some("fine"))));
    assert!(is_reportable(&entry("S", 0.0, 3.0, 3.0, Some("fine"))));
    assert!(!is_reportable(&entry("S", 0.0, 0.0, 5.0, Some("fine"))));
    assert!(!is_reportable(&entry("S", 4.0, 4.0, 8.0, Some("  \t"))));
    assert!(!is_reportable(&entry("S", 4.0, 4.0, 8.0, None)));
}

#[test]
fn dedup_keeps_first_per_exam_and_subject() {
    let out = dedup_first_per_exam_subject(vec![
        score("ex1", "math", "first"),
        score("ex1", "math", "second"),
        score("ex2", "math", "other-exam"),
        score("ex1", "art", "other-subject"),
    ]);
    let comments: Vec<&str> = out.iter().map(|s| s.comment.as_str()).collect();
    assert_eq!(comments, vec!["first", "other-exam", "other-subject"]);
}
