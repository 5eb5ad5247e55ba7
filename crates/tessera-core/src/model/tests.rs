use crate::{
    model::{Field, FieldKind, Method, Model, ModelKind, Registry},
    test_support::{declare_fixture_registry, fixture_registry},
    value::FieldMap,
};

fn noop() -> Method {
    Method::compute(|_| Ok(FieldMap::new()))
}

#[test]
fn bootstrap_freezes_the_registry() {
    let mut registry = declare_fixture_registry();
    assert!(!registry.is_bootstrapped());

    registry.bootstrap().expect("bootstrap");
    assert!(registry.is_bootstrapped());

    let err = registry
        .add_model(Model::new("Late"))
        .expect_err("frozen registry");
    assert!(err.is_schema());
    assert!(
        registry
            .add_field("User", Field::char("Nick"))
            .expect_err("frozen registry")
            .is_schema()
    );
}

#[test]
fn duplicate_models_and_fields_are_rejected() {
    let mut registry = Registry::new();
    registry.add_model(Model::new("A")).expect("first");

    assert!(registry.add_model(Model::new("A")).is_err());
    assert!(
        registry
            .add_model(
                Model::new("B")
                    .field(Field::char("Name"))
                    .field(Field::text("Name"))
            )
            .is_err()
    );
    assert!(registry.add_field("A", Field::char("ID")).is_err());
}

#[test]
fn fields_are_found_by_name_and_json_name() {
    let registry = fixture_registry();
    let post = registry.model("Post").expect("post");

    let by_name = post.try_field("User").expect("by name");
    let by_json = post.try_field("user_id").expect("by json");
    assert_eq!(by_name.name(), by_json.name());
    assert_eq!(by_json.json_name(), "user_id");
    assert_eq!(post.try_field("Tags").expect("m2m").json_name(), "tags_ids");
    assert!(post.try_field("Nope").is_err());
}

#[test]
fn many2many_sides_share_one_link_model() {
    let registry = fixture_registry();

    let post_tags = registry
        .model("Post")
        .and_then(|m| m.try_field("Tags"))
        .expect("Post.Tags");
    let tag_posts = registry
        .model("Tag")
        .and_then(|m| m.try_field("Posts"))
        .expect("Tag.Posts");
    let (a, b) = (
        post_tags.link().expect("link"),
        tag_posts.link().expect("link"),
    );

    assert_eq!(a.table, "post_tag_rel");
    assert_eq!(a.table, b.table);
    assert_eq!((a.our.as_str(), a.their.as_str()), ("post_id", "tag_id"));
    assert_eq!((b.our.as_str(), b.their.as_str()), ("tag_id", "post_id"));

    let link = registry.model(&a.model).expect("link model");
    assert_eq!(link.kind(), ModelKind::Link);
    assert!(!link.has_bookkeeping());
    assert_eq!(
        registry
            .models()
            .filter(|m| m.kind() == ModelKind::Link)
            .count(),
        1
    );
}

fn article_registry(featured: Field) -> Registry {
    let mut registry = Registry::new();
    registry
        .add_model(
            Model::new("Article")
                .field(Field::many2many("Tags", "Label"))
                .field(featured)
                .field(
                    Field::many2many("Top", "Label")
                        .compute("Top")
                        .depends(["Tags"]),
                )
                .method("Top", noop()),
        )
        .expect("register");
    registry
        .add_model(Model::new("Label").field(Field::char("Name")))
        .expect("register");

    registry
}

#[test]
fn second_relation_to_the_same_model_needs_its_own_link_table() {
    let mut registry = article_registry(Field::many2many("Featured", "Label"));
    let err = registry.bootstrap().expect_err("link column already used");
    assert!(err.is_schema());
    assert!(err.message.contains("already used by 'Article.Tags'"));

    let mut registry = article_registry(Field::many2many("Featured", "Label").link_table(
        "article_featured_rel",
        "article_id",
        "label_id",
    ));
    registry.bootstrap().expect("distinct link table");

    let article = registry.model("Article").expect("article");
    let tags = article.try_field("Tags").expect("tags").link().expect("link");
    let featured = article.try_field("Featured").expect("featured").link().expect("link");
    assert_eq!(tags.table, "article_label_rel");
    assert_eq!(featured.table, "article_featured_rel");
    assert_eq!(
        registry
            .models()
            .filter(|m| m.kind() == ModelKind::Link)
            .count(),
        2
    );
}

#[test]
fn transient_many2many_gets_no_link() {
    let mut registry = article_registry(Field::many2many("Featured", "Label").link_table(
        "article_featured_rel",
        "article_id",
        "label_id",
    ));
    registry.bootstrap().expect("bootstrap");

    let top = registry
        .model("Article")
        .and_then(|m| m.try_field("Top"))
        .expect("top");
    assert!(!top.is_stored());
    assert!(top.link().is_none());
}

#[test]
fn self_relation_numbers_its_link_columns() {
    let mut registry = Registry::new();
    registry
        .add_model(Model::new("Person").field(Field::many2many("Friends", "Person")))
        .expect("register");
    registry.bootstrap().expect("bootstrap");

    let link = registry
        .model("Person")
        .and_then(|m| m.try_field("Friends"))
        .expect("field")
        .link()
        .cloned()
        .expect("link");
    assert_eq!(link.table, "person_person_rel");
    assert_eq!((link.our.as_str(), link.their.as_str()), ("person1_id", "person2_id"));
}

#[test]
fn dependencies_invert_into_triggers() {
    let registry = fixture_registry();
    let invoice = registry.model("Invoice").expect("invoice");
    let line = registry.model("InvoiceLine").expect("line");

    let on_amount = registry.triggers_for(line.id(), "Amount");
    assert_eq!(on_amount.len(), 1);
    assert_eq!(on_amount[0].model, invoice.id());
    assert_eq!(on_amount[0].path, "Lines");
    assert_eq!(on_amount[0].field, "Total");
    assert!(on_amount[0].stored);

    let mut on_parent: Vec<&str> = registry
        .triggers_for(line.id(), "Invoice")
        .iter()
        .map(|t| t.field.as_str())
        .collect();
    on_parent.sort_unstable();
    assert_eq!(on_parent, ["LineCount", "Total"]);

    let on_lines = registry.triggers_for(invoice.id(), "Lines");
    assert!(on_lines.iter().all(|t| t.path.is_empty()));
    assert_eq!(on_lines.len(), 2);

    assert!(registry.triggers_for(line.id(), "WriteDate").is_empty());
}

#[test]
fn related_fields_become_transient_computed_fields() {
    let registry = fixture_registry();
    let user = registry.model("User").expect("user");
    let age = user.try_field("Age").expect("age");

    assert!(age.is_computed());
    assert!(!age.is_stored());
    assert!(!age.has_column());
    assert_eq!(age.depends_paths(), ["Profile.Age"]);

    let profile = registry.model("Profile").expect("profile");
    let triggers = registry.triggers_for(profile.id(), "Age");
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].path, "Profile");
    assert!(!triggers[0].stored);
}

#[test]
fn method_kinds_are_checked_at_bootstrap() {
    let mut registry = Registry::new();
    registry
        .add_model(
            Model::new("Sheet")
                .field(Field::integer("Size").compute("Size"))
                .method("Size", Method::inverse(|_, _| Ok(()))),
        )
        .expect("register");

    let err = registry.bootstrap().expect_err("inverse used as compute");
    assert!(err.message.contains("must be a compute method"));
}

#[test]
fn constraints_must_name_a_constraint_method() {
    let mut registry = Registry::new();
    registry
        .add_model(
            Model::new("Sheet")
                .field(Field::integer("Size").constraint("CheckSize"))
                .method("CheckSize", noop()),
        )
        .expect("register");
    let err = registry.bootstrap().expect_err("compute used as constraint");
    assert!(err.message.contains("must be a constraint method"));

    let mut registry = Registry::new();
    registry
        .add_model(
            Model::new("Sheet")
                .field(Field::integer("Size").constraint("CheckSize"))
                .method("CheckSize", Method::constraint(|_| Ok(()))),
        )
        .expect("register");
    registry.bootstrap().expect("constraint method");
}

#[test]
fn missing_methods_and_bad_paths_fail_bootstrap() {
    let mut registry = Registry::new();
    registry
        .add_model(Model::new("Sheet").field(Field::integer("Size").compute("Missing")))
        .expect("register");
    assert!(registry.bootstrap().is_err());

    let mut registry = Registry::new();
    registry
        .add_model(
            Model::new("Sheet")
                .field(Field::char("Name"))
                .field(Field::integer("Size").compute("Size").depends(["Name.Len"]))
                .method("Size", noop()),
        )
        .expect("register");
    let err = registry.bootstrap().expect_err("Name is no relation");
    assert!(err.message.contains("is not a relation"));
}

#[test]
fn reverse_keys_must_point_back() {
    let mut registry = Registry::new();
    registry
        .add_model(Model::new("Folder").field(Field::one2many("Files", "File", "Owner")))
        .expect("register");
    registry
        .add_model(Model::new("File").field(Field::char("Owner")))
        .expect("register");

    let err = registry.bootstrap().expect_err("Owner is no foreign key");
    assert!(err.message.contains("invalid reverse key"));
}

#[test]
fn unknown_relation_target_fails_bootstrap() {
    let mut registry = Registry::new();
    registry
        .add_model(Model::new("Post").field(Field::many2one("Author", "Nobody")))
        .expect("register");

    assert!(registry.bootstrap().is_err());
}

#[test]
fn manual_models_keep_fields_but_get_no_table() {
    let model = Model::manual("Legacy").field(Field::char("Code"));

    assert_eq!(model.kind(), ModelKind::Manual);
    assert!(!model.has_table());
    assert_eq!(model.try_field("Code").expect("code").kind(), FieldKind::Char);
}

#[test]
fn added_methods_are_visible_after_bootstrap() {
    let mut registry = Registry::new();
    registry
        .add_model(Model::new("Sheet").field(Field::integer("Size")))
        .expect("register");
    registry
        .add_field(
            "Sheet",
            Field::integer("Double").compute("Double").depends(["Size"]),
        )
        .expect("add field");
    registry
        .add_method("Sheet", "Double", noop())
        .expect("add method");
    registry.bootstrap().expect("bootstrap");

    let sheet = registry.model("Sheet").expect("sheet");
    assert!(matches!(sheet.get_method("Double"), Some(Method::Compute(_))));
    assert_eq!(registry.triggers_for(sheet.id(), "Size").len(), 1);
}
