use crate::{Region, TargetPoint};

/// Picks the largest candidate by area and aims at its centre. The first
/// region wins a tie.
pub fn select_target(regions: &[Region]) -> TargetPoint {
    let mut largest: Option<&Region> = None;
    for region in regions {
        match largest {
            Some(best) if region.area() <= best.area() => {}
            _ => largest = Some(region),
        }
    }

    match largest {
        Some(region) => {
            let (x, y) = region.centroid();
            TargetPoint::Found { x, y }
        }
        None => TargetPoint::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_regions_means_no_target() {
        assert_eq!(select_target(&[]), TargetPoint::NotFound);
    }

    #[test]
    fn picks_largest_region() {
        let regions = [
            Region::new(0, 0, 40, 40),
            Region::new(300, 200, 100, 80),
            Region::new(500, 10, 60, 60),
        ];
        assert_eq!(select_target(&regions), TargetPoint::Found { x: 350, y: 240 });
    }

    #[test]
    fn first_region_wins_tie() {
        let regions = [Region::new(0, 0, 50, 50), Region::new(100, 100, 50, 50)];
        assert_eq!(select_target(&regions), TargetPoint::Found { x: 25, y: 25 });
    }
}
