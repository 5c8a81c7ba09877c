const BOARD_VARIANTS: [&str; 3] = ["CARGO_FEATURE_TS", "CARGO_FEATURE_TRS", "CARGO_FEATURE_XLR"];

fn main() {
    let num_enabled_variant_features = std::env::vars()
        .map(|(a, _)| a)
        .filter(|x| BOARD_VARIANTS.contains(&x.as_str()))
        .count();

    match num_enabled_variant_features {
        0 => panic!("\x1b[31;1m No board variant enabled. Enable the feature that matches the tester's fixture. e.g. '--features xlr' \x1b[0m"),
        1 => (),
        _ => panic!("\x1b[31;1m Multiple board variants enabled. Use '--no-default-features' and enable only the variant that matches the tester's fixture. \x1b[0m"),
    };
}
