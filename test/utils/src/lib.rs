use std::env;

pub fn insta_snapshot<F: FnOnce()>(f: F) {
    let mut settings = insta::Settings::clone_current();
    let snapshot_path = env::current_dir().unwrap().join("./test/snapshots");
    settings.set_snapshot_path(snapshot_path);
    settings.bind(f);
}

pub fn wardrobe_fixture() -> &'static str {
    return r#"
- name: Linen shirt
  category: Tops
  color: White
  season: Summer
- name: Slim chinos
  category: Bottoms
  color: Beige
  season: Summer
- name: Silk kurta
  category: Ethnic
  color: Maroon
  season: All Season
"#
    .trim();
}

pub fn stream_fixture(fragments: &[&str]) -> String {
    let mut lines = fragments
        .iter()
        .map(|fragment| {
            return format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{fragment}\"}}}}]}}\n\n");
        })
        .collect::<Vec<String>>()
        .join("");

    lines += "data: [DONE]\n";
    return lines;
}
