use foundation::{
    MlErr, Result,
    dataset::{Column, Table},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

/// The label column of [`wine_like`].
pub const WINE_LABEL: &str = "cultivar";
/// The label column of [`housing_like`].
pub const HOUSING_LABEL: &str = "price";

const CULTIVARS: [(&str, usize); 3] = [("barolo", 47), ("grignolino", 57), ("barbera", 38)];

// Per cultivar centers of alcohol, malic acid, flavanoids and color intensity.
const CENTERS: [[f64; 4]; 3] = [
    [13.7, 2.0, 2.9, 5.5],
    [12.3, 1.9, 2.1, 3.1],
    [13.1, 3.3, 0.8, 7.4],
];
const SPREADS: [f64; 4] = [0.5, 0.9, 0.4, 1.2];

/// A 142 row table of three wine cultivars, described by four chemical measurements
/// and the vineyard's soil.
pub fn wine_like(seed: u64) -> Result<Table> {
    let mut rng = StdRng::seed_from_u64(seed);
    let soils = ["clay", "limestone", "sand"];

    let mut measures = vec![Vec::new(); CENTERS[0].len()];
    let mut soil = Vec::new();
    let mut cultivar = Vec::new();

    for (c, &(name, rows)) in CULTIVARS.iter().enumerate() {
        for _ in 0..rows {
            for (j, column) in measures.iter_mut().enumerate() {
                let normal = Normal::new(CENTERS[c][j], SPREADS[j]).map_err(|e| {
                    MlErr::InvalidTable(format!("bad toy distribution: {e}"))
                })?;
                column.push(normal.sample(&mut rng));
            }
            // Soil leans towards one cultivar but isn't decisive.
            let s = if rng.random_bool(0.6) { c } else { rng.random_range(0..soils.len()) };
            soil.push(soils[s]);
            cultivar.push(name);
        }
    }

    let names = ["alcohol", "malic_acid", "flavanoids", "color_intensity"];
    let mut columns: Vec<(&str, Column)> = names
        .into_iter()
        .zip(measures)
        .map(|(name, values)| (name, Column::from(values)))
        .collect();
    columns.push(("soil", Column::categorical(soil)));
    columns.push((WINE_LABEL, Column::categorical(cultivar)));

    Table::new(columns)
}

/// A regression table of house prices, linear in size and rooms with a neighborhood
/// premium and some noise.
pub fn housing_like(rows: usize, seed: u64) -> Result<Table> {
    let mut rng = StdRng::seed_from_u64(seed);
    let neighborhoods = [("center", 40.0), ("suburb", 0.0), ("outskirts", -25.0)];
    let noise = Normal::new(0.0, 8.0)
        .map_err(|e| MlErr::InvalidTable(format!("bad toy distribution: {e}")))?;

    let mut size = Vec::with_capacity(rows);
    let mut rooms = Vec::with_capacity(rows);
    let mut neighborhood = Vec::with_capacity(rows);
    let mut price = Vec::with_capacity(rows);

    for _ in 0..rows {
        let m2: f64 = rng.random_range(35.0..180.0);
        let r = (m2 / 30.0).round().max(1.0);
        let (name, premium) = neighborhoods[rng.random_range(0..neighborhoods.len())];

        size.push(m2);
        rooms.push(r);
        neighborhood.push(name);
        price.push(20.0 + 1.8 * m2 + 6.0 * r + premium + noise.sample(&mut rng));
    }

    Table::new(vec![
        ("size_m2", Column::from(size)),
        ("rooms", Column::from(rooms)),
        ("neighborhood", Column::categorical(neighborhood)),
        (HOUSING_LABEL, Column::from(price)),
    ])
}
